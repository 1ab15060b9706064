use std::sync::OnceLock;

use regex_lite::{Regex, RegexBuilder};
use reqwest::Url;

use crate::config::ImageConfig;
use crate::feed::RawFeedItem;

/// Finds and normalizes image URLs in feed items.
#[derive(Debug, Clone)]
pub struct ImageExtractor {
    cdn_hosts: Vec<String>,
    width_segment: String,
}

impl ImageExtractor {
    pub fn new(cfg: &ImageConfig) -> Self {
        Self {
            cdn_hosts: cfg.cdn_hosts.clone(),
            width_segment: format!("/w_{},c_limit/", cfg.thumbnail_width),
        }
    }

    /// Returns the `src` of the first `<img>` tag in `html`.
    pub fn extract_image(&self, html: &str) -> Option<String> {
        static IMG: OnceLock<Regex> = OnceLock::new();

        if html.is_empty() {
            return None;
        }

        let img = IMG.get_or_init(|| {
            RegexBuilder::new(r#"<img[^>]+src=["']([^"']+)["']"#)
                .case_insensitive(true)
                .build()
                .unwrap()
        });
        let src = img.captures(html)?.get(1)?.as_str();

        Some(self.rewrite_width(src))
    }

    /// Asks known CDNs for a thumbnail of a fixed width.
    pub fn rewrite_width(&self, url: &str) -> String {
        static WIDTH: OnceLock<Regex> = OnceLock::new();

        if !self.cdn_hosts.iter().any(|host| url.contains(host.as_str())) {
            return url.to_owned();
        }

        let width = WIDTH.get_or_init(|| Regex::new(r"/w_\d+,c_limit/").unwrap());

        width
            .replacen(url, 1, regex_lite::NoExpand(&self.width_segment))
            .into_owned()
    }

    /// Picks the best image the item itself declares.
    ///
    /// Sources are tried in a fixed order: the thumbnail, an `image/*` enclosure, the first image
    /// of the content, the first image of the description.
    pub fn resolve_image(&self, item: &RawFeedItem) -> Option<String> {
        if let Some(thumbnail) = item.thumbnail.as_ref().filter(|s| !s.is_empty()) {
            return Some(thumbnail.clone());
        }

        if let Some(enclosure) = &item.enclosure {
            let is_image = enclosure
                .mime_type
                .as_deref()
                .is_some_and(|mime_type| mime_type.starts_with("image/"));

            if is_image && !enclosure.link.is_empty() {
                return Some(enclosure.link.clone());
            }
        }

        self.extract_image(&item.content)
            .or_else(|| self.extract_image(&item.description))
    }
}

/// Turns an image candidate into an absolute URL, resolving it against the post link if needed.
pub fn absolutize(candidate: &str, base: Option<&Url>) -> Option<Url> {
    let candidate = candidate.trim();

    if candidate.is_empty() {
        return None;
    }

    match Url::parse(candidate) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(candidate).ok(),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::feed::Enclosure;

    use super::*;

    fn extractor() -> ImageExtractor {
        ImageExtractor::new(&ImageConfig::default())
    }

    fn item() -> RawFeedItem {
        RawFeedItem {
            title: "Post".into(),
            link: "https://blog.example.com/p/post".into(),
            description: r#"<p><img src="https://example.com/desc.png"></p>"#.into(),
            content: r#"<figure><img alt="" src='https://example.com/content.png'></figure>"#
                .into(),
            pub_date: "2024-01-15 10:30:00".into(),
            author: None,
            thumbnail: Some("https://example.com/thumb.png".into()),
            enclosure: Some(Enclosure {
                link: "https://example.com/enclosure.png".into(),
                mime_type: Some("image/png".into()),
            }),
        }
    }

    #[test]
    fn extracts_first_image() {
        let ex = extractor();

        assert_eq!(
            ex.extract_image(r#"<p>x</p><IMG class="a" SRC="https://a.example/1.png"><img src="https://a.example/2.png">"#),
            Some("https://a.example/1.png".into())
        );
        assert_eq!(
            ex.extract_image("<img src='https://a.example/q.png' />"),
            Some("https://a.example/q.png".into())
        );
    }

    #[test]
    fn no_image_tag_means_none() {
        let ex = extractor();

        assert_eq!(ex.extract_image(""), None);
        assert_eq!(ex.extract_image("<p>just text</p>"), None);
        assert_eq!(ex.extract_image(r#"<picture><source srcset="a.png"></picture>"#), None);
        assert_eq!(ex.extract_image("<img>"), None);
    }

    #[test]
    fn rewrites_cdn_width() {
        let ex = extractor();
        let url = "https://substackcdn.com/image/fetch/w_1456,c_limit,f_auto/https%3A%2F%2Fx.png";
        // only the exact `w_N,c_limit/` segment is touched.
        assert_eq!(ex.rewrite_width(url), url);

        let url = "https://substackcdn.com/image/fetch/w_1456,c_limit/f_webp/https%3A%2F%2Fx.png";
        assert_eq!(
            ex.rewrite_width(url),
            "https://substackcdn.com/image/fetch/w_400,c_limit/f_webp/https%3A%2F%2Fx.png"
        );

        assert_eq!(
            ex.extract_image(&format!(r#"<img src="{url}">"#)),
            Some("https://substackcdn.com/image/fetch/w_400,c_limit/f_webp/https%3A%2F%2Fx.png".into())
        );
    }

    #[test]
    fn leaves_other_hosts_alone() {
        let url = "https://images.example.com/w_1456,c_limit/x.png";
        assert_eq!(extractor().rewrite_width(url), url);
    }

    #[test]
    fn honors_configured_width() {
        let ex = ImageExtractor::new(&ImageConfig {
            cdn_hosts: vec!["cdn.example.net".into()],
            thumbnail_width: 640,
        });

        assert_eq!(
            ex.rewrite_width("https://cdn.example.net/w_100,c_limit/a.jpg"),
            "https://cdn.example.net/w_640,c_limit/a.jpg"
        );
    }

    #[test]
    fn thumbnail_wins() {
        let mut item = item();
        assert_eq!(
            extractor().resolve_image(&item).as_deref(),
            Some("https://example.com/thumb.png")
        );

        item.enclosure = None;
        item.content.clear();
        item.description.clear();
        assert_eq!(
            extractor().resolve_image(&item).as_deref(),
            Some("https://example.com/thumb.png")
        );
    }

    #[test]
    fn cascade_order() {
        let ex = extractor();
        let mut item = item();

        item.thumbnail = None;
        assert_eq!(
            ex.resolve_image(&item).as_deref(),
            Some("https://example.com/enclosure.png")
        );

        item.enclosure = None;
        assert_eq!(
            ex.resolve_image(&item).as_deref(),
            Some("https://example.com/content.png")
        );

        item.content = "<p>no images here</p>".into();
        assert_eq!(
            ex.resolve_image(&item).as_deref(),
            Some("https://example.com/desc.png")
        );

        item.description = "<p>nor here</p>".into();
        assert_eq!(ex.resolve_image(&item), None);
    }

    #[test]
    fn empty_thumbnail_is_skipped() {
        let mut item = item();
        item.thumbnail = Some(String::new());

        assert_eq!(
            extractor().resolve_image(&item).as_deref(),
            Some("https://example.com/enclosure.png")
        );
    }

    #[test]
    fn non_image_enclosure_is_never_selected() {
        let ex = extractor();
        let mut item = item();
        item.thumbnail = None;
        item.content.clear();
        item.description.clear();

        for mime_type in [Some("audio/mpeg"), Some("video/mp4"), None] {
            item.enclosure = Some(Enclosure {
                link: "https://example.com/episode.mp3".into(),
                mime_type: mime_type.map(String::from),
            });

            assert_eq!(ex.resolve_image(&item), None);
        }
    }

    #[test]
    fn absolutizes_candidates() {
        let base = Url::parse("https://blog.example.com/p/post").unwrap();

        assert_eq!(
            absolutize("https://cdn.example.com/a.png", Some(&base)).map(String::from),
            Some("https://cdn.example.com/a.png".into())
        );
        assert_eq!(
            absolutize("/images/a.png", Some(&base)).map(String::from),
            Some("https://blog.example.com/images/a.png".into())
        );
        assert_eq!(absolutize("/images/a.png", None), None);
        assert_eq!(absolutize("   ", Some(&base)), None);
        assert_eq!(absolutize("http://[bad", Some(&base)), None);
    }
}
