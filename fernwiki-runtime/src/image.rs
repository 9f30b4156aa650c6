//! The scaled-image pipeline.
//!
//! Request names follow `WxH-base@Sx.ext` with every numeric field optional;
//! a zero width or height means unconstrained. True dimensions multiply by
//! the retina scale. Scaled variants are generated into `cache/image/` and
//! obey the same mtime freshness rule as pages.

use ::image::imageops::FilterType;
use ::image::GenericImageView;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("bad image name '{0}'")]
    BadName(String),

    #[error("scale {0}x is not allowed")]
    ScaleNotAllowed(u32),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("image: {0}")]
    Decode(#[from] ::image::ImageError),
}

static SIZED_NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn sized_name_regex() -> &'static Regex {
    SIZED_NAME_REGEX.get_or_init(|| {
        Regex::new(r"^(?:(\d+)x(\d+)-)?(.+?)(?:@(\d+)x)?\.([^.]+)$").unwrap()
    })
}

/// A sized-image request parsed from a name like `100x200-pic@3x.png`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizedImage {
    /// Requested width; 0 means unconstrained.
    pub width: u32,
    /// Requested height; 0 means unconstrained.
    pub height: u32,
    /// Retina scale; 1 means none.
    pub scale: u32,
    /// Base name without dimensions, scale, or extension.
    pub name: String,
    pub ext: String,
}

impl SizedImage {
    /// Parse a request name. Any of width, height, and scale may be absent.
    pub fn from_name(name: &str) -> Result<SizedImage, ImageError> {
        let caps = sized_name_regex()
            .captures(name)
            .ok_or_else(|| ImageError::BadName(name.to_string()))?;

        let number = |i: usize| -> u32 {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };

        Ok(SizedImage {
            width: number(1),
            height: number(2),
            scale: number(4).max(1),
            name: caps[3].to_string(),
            ext: caps[5].to_string(),
        })
    }

    /// The underlying full-size file name.
    pub fn base_name(&self) -> String {
        format!("{}.{}", self.name, self.ext)
    }

    pub fn true_width(&self) -> u32 {
        self.width * self.scale.max(1)
    }

    pub fn true_height(&self) -> u32 {
        self.height * self.scale.max(1)
    }

    /// Canonical name at true dimensions, scale folded in:
    /// `100x200-pic@3x.png` becomes `300x600-pic.png`.
    pub fn full_name(&self) -> String {
        if self.width == 0 && self.height == 0 {
            return self.base_name();
        }
        format!(
            "{}x{}-{}.{}",
            self.true_width(),
            self.true_height(),
            self.name,
            self.ext
        )
    }

    /// Canonical request name with the retina suffix; a scale of 1 has no
    /// suffix.
    pub fn scale_name(&self) -> String {
        let dims = if self.width == 0 && self.height == 0 {
            String::new()
        } else {
            format!("{}x{}-", self.width, self.height)
        };
        let scale = if self.scale <= 1 {
            String::new()
        } else {
            format!("@{}x", self.scale)
        };
        format!("{}{}{}.{}", dims, self.name, scale, self.ext)
    }

    /// True when the request wants the untouched full-size file.
    pub fn is_full_size(&self) -> bool {
        self.width == 0 && self.height == 0 && self.scale <= 1
    }

    /// Apply the retina policy: a scale outside the allowed list is raised
    /// to the nearest allowed scale, or rejected when generation is off.
    pub fn normalize_scale(&mut self, allowed: &[u32], generate_ok: bool) -> Result<(), ImageError> {
        if self.scale <= 1 || allowed.contains(&self.scale) {
            return Ok(());
        }
        if !generate_ok {
            return Err(ImageError::ScaleNotAllowed(self.scale));
        }
        match allowed.iter().copied().filter(|&s| s >= self.scale).min() {
            Some(next) => {
                self.scale = next;
                Ok(())
            }
            None => Err(ImageError::ScaleNotAllowed(self.scale)),
        }
    }
}

impl fmt::Display for SizedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scale_name())
    }
}

/// Generate a scaled variant of `source` at `dest`, preserving aspect ratio
/// for unconstrained axes. The write is atomic.
pub fn generate_scaled(source: &Path, dest: &Path, sized: &SizedImage) -> Result<(), ImageError> {
    let img = ::image::open(source)?;
    let (ow, oh) = img.dimensions();

    let (tw, th) = match (sized.true_width(), sized.true_height()) {
        (0, 0) => (ow, oh),
        (0, h) => (((ow as u64 * h as u64) / oh.max(1) as u64) as u32, h),
        (w, 0) => (w, ((oh as u64 * w as u64) / ow.max(1) as u64) as u32),
        (w, h) => (w, h),
    };

    let resized = img.resize_exact(tw.max(1), th.max(1), FilterType::Lanczos3);

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = crate::cache::temp_sibling(dest);
    resized.save(&tmp)?;
    std::fs::rename(&tmp, dest)?;
    tracing::debug!(dest = %dest.display(), width = tw, height = th, "generated scaled image");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_form() {
        let sized = SizedImage::from_name("100x200-pic@3x.png").unwrap();
        assert_eq!(sized.width, 100);
        assert_eq!(sized.height, 200);
        assert_eq!(sized.scale, 3);
        assert_eq!(sized.name, "pic");
        assert_eq!(sized.ext, "png");
    }

    #[test]
    fn test_true_dimensions() {
        let sized = SizedImage::from_name("100x200-pic@3x.png").unwrap();
        assert_eq!(sized.true_width(), 300);
        assert_eq!(sized.true_height(), 600);
    }

    #[test]
    fn test_full_and_scale_names() {
        let sized = SizedImage::from_name("100x200-pic@3x.png").unwrap();
        assert_eq!(sized.full_name(), "300x600-pic.png");
        assert_eq!(sized.scale_name(), "100x200-pic@3x.png");
    }

    #[test]
    fn test_parse_round_trips_canonical_name() {
        for name in ["pic.png", "100x200-pic.png", "0x220-pic.jpg", "100x200-pic@2x.png"] {
            let sized = SizedImage::from_name(name).unwrap();
            assert_eq!(sized.scale_name(), name, "round trip of {name}");
        }
    }

    #[test]
    fn test_plain_name() {
        let sized = SizedImage::from_name("pic.png").unwrap();
        assert_eq!(sized.width, 0);
        assert_eq!(sized.height, 0);
        assert_eq!(sized.scale, 1);
        assert!(sized.is_full_size());
        assert_eq!(sized.full_name(), "pic.png");
    }

    #[test]
    fn test_dotted_base_name() {
        let sized = SizedImage::from_name("some.photo.jpeg").unwrap();
        assert_eq!(sized.name, "some.photo");
        assert_eq!(sized.ext, "jpeg");
    }

    #[test]
    fn test_scale_without_dimensions() {
        let sized = SizedImage::from_name("pic@2x.png").unwrap();
        assert_eq!(sized.width, 0);
        assert_eq!(sized.scale, 2);
        assert!(!sized.is_full_size());
    }

    #[test]
    fn test_bad_name_rejected() {
        assert!(SizedImage::from_name("noextension").is_err());
        assert!(SizedImage::from_name("").is_err());
    }

    #[test]
    fn test_normalize_scale_rounds_up() {
        let mut sized = SizedImage::from_name("10x10-pic@2x.png").unwrap();
        sized.normalize_scale(&[3], true).unwrap();
        assert_eq!(sized.scale, 3);
    }

    #[test]
    fn test_normalize_scale_rejects_without_generation() {
        let mut sized = SizedImage::from_name("10x10-pic@2x.png").unwrap();
        assert!(sized.normalize_scale(&[3], false).is_err());
    }

    #[test]
    fn test_normalize_scale_rejects_above_max() {
        let mut sized = SizedImage::from_name("10x10-pic@4x.png").unwrap();
        assert!(sized.normalize_scale(&[2, 3], true).is_err());
    }

    #[test]
    fn test_generate_scaled_writes_resized_file() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("pic.png");
        image::RgbaImage::new(8, 4).save(&source).unwrap();

        let sized = SizedImage::from_name("4x2-pic@2x.png").unwrap();
        let dest = tmp.path().join("cache").join(sized.scale_name());
        generate_scaled(&source, &dest, &sized).unwrap();

        let (w, h) = image::image_dimensions(&dest).unwrap();
        assert_eq!((w, h), (8, 4));
    }

    #[test]
    fn test_generate_scaled_unconstrained_width() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("pic.png");
        image::RgbaImage::new(8, 4).save(&source).unwrap();

        let sized = SizedImage::from_name("0x2-pic.png").unwrap();
        let dest = tmp.path().join("0x2-pic.png");
        generate_scaled(&source, &dest, &sized).unwrap();

        let (w, h) = image::image_dimensions(&dest).unwrap();
        assert_eq!((w, h), (4, 2));
    }
}
