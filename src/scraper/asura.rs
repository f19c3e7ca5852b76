//! Asura Comics adapter. Chapter pages keep their pages in `#readerarea` as lazy
//! `<img decoding="async" src=...>` elements; series pages list chapters newest first in `#chapterlist`.

use crate::scraper::select_urls_in_region;
use reqwest::Url;

pub(crate) const HOSTS: &[&str] = &["asuracomics.com", "asuracomics.gg", "asurascans.com"];

const READER_REGION: &str = "#readerarea";
const READER_IMAGES: &str = r#"img[decoding="async"][src]"#;
const IMAGE_ATTR: &str = "src";

const CHAPTER_LIST: &str = "#chapterlist";
const CHAPTER_LINKS: &str = "a[href]";

pub(crate) fn extract_image_urls(html: &str, page_url: &Url) -> Vec<Url> {
    select_urls_in_region(html, page_url, READER_REGION, READER_IMAGES, IMAGE_ATTR)
        .unwrap_or_else(|| {
            tracing::warn!("no reader area at {}", page_url);
            Vec::new()
        })
}

pub(crate) fn chapter_links(html: &str, page_url: &Url) -> Vec<Url> {
    select_urls_in_region(html, page_url, CHAPTER_LIST, CHAPTER_LINKS, "href").unwrap_or_else(
        || {
            tracing::warn!("no chapter list at {}", page_url);
            Vec::new()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER_HTML: &str = r#"<!DOCTYPE html><html><body>
<header><img decoding="async" src="https://asuracomics.com/wp-content/logo.png"></header>
<div id="readerarea">
<p><img decoding="async" src="https://cdn.asuracomics.com/ch1/01.jpg"></p>
<p><img decoding="async" src="/wp-content/uploads/ch1/02.jpg"></p>
<img src="https://cdn.asuracomics.com/ads/banner.gif">
<p><img decoding="async" src="https://cdn.asuracomics.com/ch1/03.jpg"></p>
</div>
<div class="comments"><img decoding="async" src="https://cdn.asuracomics.com/avatar.png"></div>
</body></html>"#;

    #[test]
    fn extracts_reader_images_in_order() {
        let page = Url::parse("https://asuracomics.com/102-omniscient-reader-chapter-1/").unwrap();
        let urls = extract_image_urls(CHAPTER_HTML, &page);
        let urls: Vec<&str> = urls.iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.asuracomics.com/ch1/01.jpg",
                "https://asuracomics.com/wp-content/uploads/ch1/02.jpg",
                "https://cdn.asuracomics.com/ch1/03.jpg",
            ]
        );
    }

    #[test]
    fn missing_reader_area_gives_empty_list() {
        let page = Url::parse("https://asuracomics.com/102-omniscient-reader-chapter-1/").unwrap();
        let html = "<html><body><h1>404</h1><img decoding=\"async\" src=\"/x.jpg\"></body></html>";
        assert!(extract_image_urls(html, &page).is_empty());
    }

    #[test]
    fn chapter_links_in_document_order_and_absolute() {
        let page = Url::parse("https://asuracomics.com/manga/omniscient-reader/").unwrap();
        let html = r#"<div id="chapterlist"><ul>
<li><a href="https://asuracomics.com/102-omniscient-reader-chapter-3/">Chapter 3</a></li>
<li><a href="/102-omniscient-reader-chapter-2/">Chapter 2</a></li>
<li><a href="https://asuracomics.com/102-omniscient-reader-chapter-1/">Chapter 1</a></li>
</ul></div><a href="/other/">Other</a>"#;
        let links: Vec<String> = chapter_links(html, &page)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            links,
            vec![
                "https://asuracomics.com/102-omniscient-reader-chapter-3/",
                "https://asuracomics.com/102-omniscient-reader-chapter-2/",
                "https://asuracomics.com/102-omniscient-reader-chapter-1/",
            ]
        );
    }
}
