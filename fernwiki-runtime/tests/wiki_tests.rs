//! End-to-end wiki lifecycle tests over a temporary wiki directory.

use fernwiki_runtime::{Category, DisplayResult, SizedImage, Wiki};
use std::fs;
use std::path::Path;

const CONF: &str = "@name: testwiki;\n@main_page: main;\n@image.retina: 2,3;\n";

fn make_wiki(dir: &Path) -> Wiki {
    fs::create_dir_all(dir.join("page")).unwrap();
    fs::create_dir_all(dir.join("image")).unwrap();
    fs::create_dir_all(dir.join("model")).unwrap();
    fs::write(dir.join("wiki.conf"), CONF).unwrap();
    Wiki::open(dir).unwrap()
}

fn write_page(dir: &Path, name: &str, source: &str) {
    fs::write(dir.join("page").join(name), source).unwrap();
}

fn page_result(result: DisplayResult) -> fernwiki_runtime::DisplayPage {
    match result {
        DisplayResult::Page(p) => p,
        other => panic!("expected page, got {:?}", variant_name(&other)),
    }
}

fn variant_name(result: &DisplayResult) -> &'static str {
    match result {
        DisplayResult::Page(_) => "page",
        DisplayResult::Image(_) => "image",
        DisplayResult::Redirect(_) => "redirect",
        DisplayResult::CategoryPosts(_) => "category posts",
        DisplayResult::Error(_) => "error",
    }
}

#[test]
fn render_then_cache_hit() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(tmp.path(), "main.page", "@page.title: Main;\np { hello }");

    let first = page_result(wiki.display_page("main"));
    assert!(!first.from_cache);
    assert!(first.generated);
    assert!(first.cache_generated);
    assert!(first.html.contains("hello"));
    assert_eq!(first.info.title, "Main");

    let second = page_result(wiki.display_page("main"));
    assert!(second.from_cache);
    assert!(!second.generated);
    assert_eq!(second.html, first.html, "cached html must be identical");
}

#[test]
fn missing_page_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());

    match wiki.display_page("nope") {
        DisplayResult::Error(e) => {
            assert_eq!(e.status, 404);
            assert!(!e.parse_error);
        }
        other => panic!("expected error, got {}", variant_name(&other)),
    }
}

#[test]
fn parse_error_is_500_with_flag() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(tmp.path(), "broken.page", "sec { unclosed");

    match wiki.display_page("broken") {
        DisplayResult::Error(e) => {
            assert_eq!(e.status, 500);
            assert!(e.parse_error);
            assert!(e.detailed_error.contains("unclosed"));
        }
        other => panic!("expected error, got {}", variant_name(&other)),
    }
}

#[test]
fn draft_pages_hidden_without_draft_ok() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(tmp.path(), "wip.page", "@page.draft;\np { secret }");

    match wiki.display_page("wip") {
        DisplayResult::Error(e) => {
            assert_eq!(e.status, 404);
            assert!(e.draft);
        }
        other => panic!("expected draft error, got {}", variant_name(&other)),
    }

    let shown = page_result(wiki.display_page_draft_ok("wip"));
    assert!(shown.html.contains("secret"));

    // the draft flag survives the cache
    match wiki.display_page("wip") {
        DisplayResult::Error(e) => assert!(e.draft),
        other => panic!("expected draft error, got {}", variant_name(&other)),
    }
}

#[test]
fn redirect_variable_returns_redirect() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(tmp.path(), "moved.page", "@page.redirect: new home;\n");

    match wiki.display_page("moved") {
        DisplayResult::Redirect(r) => assert_eq!(r.redirect, "/page/new_home"),
        other => panic!("expected redirect, got {}", variant_name(&other)),
    }
}

#[test]
fn category_index_tracks_membership() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(tmp.path(), "a.page", "@category.news;\np { a }");

    page_result(wiki.display_page("a"));

    let cache_dir = tmp.path().join("cache");
    let cat = Category::load(&cache_dir, "news").unwrap();
    assert!(cat.pages.contains_key("a.page"));
    let entry = &cat.pages["a.page"];
    assert!(entry.asof.unwrap() <= cat.modified.unwrap());

    // rendering again from cache leaves the manifest untouched
    let before = fs::read(Category::path(&cache_dir, "news")).unwrap();
    page_result(wiki.display_page("a"));
    let after = fs::read(Category::path(&cache_dir, "news")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn image_category_records_dimensions_per_occurrence() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    image::RgbaImage::new(8, 8)
        .save(tmp.path().join("image/foo.png"))
        .unwrap();
    write_page(
        tmp.path(),
        "pics.page",
        "image { file: foo.png; width: 100; height: 200; }\n\
         image { file: foo.png; width: 100; height: 200; }\n",
    );

    page_result(wiki.display_page("pics"));

    let cat = Category::load(&tmp.path().join("cache"), "image-foo.png").unwrap();
    let entry = &cat.pages["pics.page"];
    assert_eq!(entry.dimensions, vec![[100, 200], [100, 200]]);
}

#[test]
fn page_links_record_line_numbers() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(tmp.path(), "b.page", "p { target }");
    write_page(
        tmp.path(),
        "a.page",
        "p { see [[ b ]] }\np { and [[ b ]] again }",
    );

    page_result(wiki.display_page("a"));

    let cat = Category::load(&tmp.path().join("cache"), "page-b.page").unwrap();
    assert_eq!(cat.pages["a.page"].lines, vec![1, 2]);
}

#[test]
fn removing_category_reference_deletes_empty_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(tmp.path(), "a.page", "@category.orphan;\np { a }");
    page_result(wiki.display_page("a"));
    assert!(Category::exists(&tmp.path().join("cache"), "orphan"));

    // rewrite the page without the category; bump mtime well past the cache
    std::thread::sleep(std::time::Duration::from_millis(20));
    write_page(tmp.path(), "a.page", "p { a only }");
    filetime_touch(&tmp.path().join("page/a.page"));

    page_result(wiki.display_page("a"));
    assert!(!Category::exists(&tmp.path().join("cache"), "orphan"));
}

// ensure the rewritten source is newer than the cache artifact even on
// filesystems with coarse mtimes
fn filetime_touch(path: &Path) {
    let content = fs::read(path).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn sized_image_generated_and_cached() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    image::RgbaImage::new(64, 64)
        .save(tmp.path().join("image/pic.png"))
        .unwrap();

    let sized = SizedImage::from_name("16x16-pic@2x.png").unwrap();
    let first = match wiki.display_sized_image(sized.clone(), true) {
        DisplayResult::Image(i) => i,
        other => panic!("expected image, got {}", variant_name(&other)),
    };
    assert!(first.generated);
    let (w, h) = image::image_dimensions(&first.path).unwrap();
    assert_eq!((w, h), (32, 32), "true dimensions are scaled");

    let second = match wiki.display_sized_image(sized, true) {
        DisplayResult::Image(i) => i,
        other => panic!("expected image, got {}", variant_name(&other)),
    };
    assert!(second.from_cache);
    assert!(!second.generated);
}

#[test]
fn disallowed_scale_rejected_without_generation() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    image::RgbaImage::new(64, 64)
        .save(tmp.path().join("image/pic.png"))
        .unwrap();

    // 5x is above every allowed scale
    let sized = SizedImage::from_name("16x16-pic@5x.png").unwrap();
    match wiki.display_sized_image(sized, false) {
        DisplayResult::Error(e) => assert_eq!(e.status, 404),
        other => panic!("expected error, got {}", variant_name(&other)),
    }
}

#[test]
fn rendered_page_pregenerates_largest_scale() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    image::RgbaImage::new(64, 64)
        .save(tmp.path().join("image/shot.png"))
        .unwrap();
    write_page(
        tmp.path(),
        "p.page",
        "image { file: shot.png; width: 8; height: 8; }",
    );

    page_result(wiki.display_page("p"));

    // retina is 2,3 so the 3x variant exists
    let variant = tmp.path().join("cache/image/8x8-shot@3x.png");
    assert!(variant.exists(), "largest scale must be pregenerated");
    let (w, h) = image::image_dimensions(&variant).unwrap();
    assert_eq!((w, h), (24, 24));
}

#[test]
fn category_posts_ordered_and_paginated() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(
        tmp.path(),
        "old.page",
        "@category.blog;\n@page.created: 2023-01-01;\np { old }",
    );
    write_page(
        tmp.path(),
        "new.page",
        "@category.blog;\n@page.created: 2024-01-01;\np { new }",
    );
    page_result(wiki.display_page("old"));
    page_result(wiki.display_page("new"));

    match wiki.display_category_posts("blog", 0) {
        DisplayResult::CategoryPosts(posts) => {
            assert_eq!(posts.num_pages, 1);
            let names: Vec<&str> = posts.pages.iter().map(|p| p.name.as_str()).collect();
            assert_eq!(names, vec!["new.page", "old.page"], "created descending");
        }
        other => panic!("expected category posts, got {}", variant_name(&other)),
    }
}

#[test]
fn missing_category_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    match wiki.display_category_posts("ghost", 0) {
        DisplayResult::Error(e) => assert_eq!(e.status, 404),
        other => panic!("expected error, got {}", variant_name(&other)),
    }
}

#[test]
fn page_info_skips_rendering() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(
        tmp.path(),
        "meta.page",
        "@page.title: Meta;\n@page.author: ferret;\nimage { file: huge.png; width: 1; height: 1; }",
    );

    let info = wiki.page_info("meta").unwrap();
    assert_eq!(info.title, "Meta");
    assert_eq!(info.author.as_deref(), Some("ferret"));
    // block evaluation was skipped, so the missing image produced no cache
    assert!(!tmp.path().join("cache/page/meta.page.cache").exists());
}

#[test]
fn pregenerate_fills_caches() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(tmp.path(), "one.page", "@category.all;\np { one }");
    write_page(tmp.path(), "two.page", "p { two }");

    let results = wiki.pregenerate();
    assert!(results.len() >= 3, "two pages and one category listing");
    assert!(tmp.path().join("cache/page/one.page.cache").exists());
    assert!(tmp.path().join("cache/page/two.page.cache").exists());
    assert!(tmp.path().join("cache/page/one.page.txt").exists());
    assert!(Category::exists(&tmp.path().join("cache"), "all"));
}

#[test]
fn conf_defaults_visible_to_pages() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(tmp.path(), "who.page", "p { wiki is [@name] }");

    let page = page_result(wiki.display_page("who"));
    assert!(page.html.contains("wiki is testwiki"), "html: {}", page.html);
}

#[test]
fn search_text_is_tag_free() {
    let tmp = tempfile::tempdir().unwrap();
    let wiki = make_wiki(tmp.path());
    write_page(tmp.path(), "s.page", "p { plain [b]bold[/b] }");
    page_result(wiki.display_page("s"));

    let text = fs::read_to_string(tmp.path().join("cache/page/s.page.txt")).unwrap();
    assert!(text.contains("plain bold"));
    assert!(!text.contains('<'));
}
