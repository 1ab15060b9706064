use reqwest::Url;
use serde::Serialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::format_description::{BorrowedFormatItem, OwnedFormatItem};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::warn;

use crate::feed::RawFeedItem;
use crate::sanitize::{excerpt, strip_html};

static DEFAULT_DATE_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[month repr:short] [day padding:none], [year]");

// what the feed-to-JSON service emits (always UTC).
static SERVICE_DATE_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// A feed entry ready to be shown.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DisplayPost {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub author: String,
    pub image: Option<String>,
    pub link: String,
}

pub struct PostAssembler {
    pub author_fallback: String,
    pub excerpt_length: usize,
    pub date_format: Option<OwnedFormatItem>,
    pub offset: UtcOffset,
}

impl PostAssembler {
    pub fn assemble(&self, index: usize, item: RawFeedItem, image: Option<Url>) -> DisplayPost {
        let published = parse_pub_date(&item.pub_date);

        let id = match published {
            Some(published) => format!(
                "blog-{index}-{}",
                published.unix_timestamp_nanos() / 1_000_000
            ),
            None => format!("blog-{index}"),
        };

        DisplayPost {
            id,
            title: item.title,
            description: excerpt(&strip_html(&item.description), self.excerpt_length),
            date: published
                .map(|published| self.format_date(published))
                .unwrap_or_default(),
            author: item
                .author
                .unwrap_or_else(|| self.author_fallback.clone()),
            image: image.map(String::from),
            link: item.link,
        }
    }

    fn format_date(&self, date: OffsetDateTime) -> String {
        let date = date.to_offset(self.offset);
        let result = match &self.date_format {
            Some(format) => date.format(format),
            None => date.format(DEFAULT_DATE_FORMAT),
        };

        result
            .inspect_err(|e| warn!("could not format the publication date ({date}): {e:#}"))
            .unwrap_or_default()
    }
}

pub fn parse_pub_date(s: &str) -> Option<OffsetDateTime> {
    let s = s.trim();

    OffsetDateTime::parse(s, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc2822))
        .or_else(|_| PrimitiveDateTime::parse(s, SERVICE_DATE_FORMAT).map(|date| date.assume_utc()))
        .ok()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::feed::Enclosure;

    use super::*;

    fn assembler() -> PostAssembler {
        PostAssembler {
            author_fallback: "Open Session".into(),
            excerpt_length: 200,
            date_format: None,
            offset: UtcOffset::UTC,
        }
    }

    fn item() -> RawFeedItem {
        RawFeedItem {
            title: "Tom &amp; Jerry <3".into(),
            link: "https://blog.example.com/p/tom".into(),
            description: "<p>Hello &amp; welcome</p>".into(),
            content: String::new(),
            pub_date: "2024-01-15 10:30:00".into(),
            author: None,
            thumbnail: None,
            enclosure: Some(Enclosure {
                link: "https://example.com/a.mp3".into(),
                mime_type: Some("audio/mpeg".into()),
            }),
        }
    }

    #[test]
    fn parses_dates() {
        let expected = datetime!(2024-01-15 10:30:00 UTC);

        assert_eq!(parse_pub_date("2024-01-15 10:30:00"), Some(expected));
        assert_eq!(parse_pub_date("2024-01-15T10:30:00Z"), Some(expected));
        assert_eq!(parse_pub_date("Mon, 15 Jan 2024 10:30:00 +0000"), Some(expected));
        assert_eq!(
            parse_pub_date("2024-01-15T12:30:00+02:00"),
            Some(expected)
        );
        assert_eq!(parse_pub_date("yesterday"), None);
        assert_eq!(parse_pub_date(""), None);
    }

    #[test]
    fn assembles_post() {
        let image = Url::parse("https://example.com/i.png").unwrap();
        let post = assembler().assemble(3, item(), Some(image));

        assert_eq!(
            post,
            DisplayPost {
                id: "blog-3-1705314600000".into(),
                title: "Tom &amp; Jerry <3".into(),
                description: "Hello & welcome".into(),
                date: "Jan 15, 2024".into(),
                author: "Open Session".into(),
                image: Some("https://example.com/i.png".into()),
                link: "https://blog.example.com/p/tom".into(),
            }
        );
    }

    #[test]
    fn keeps_author_and_missing_image() {
        let mut item = item();
        item.author = Some("Jo".into());

        let post = assembler().assemble(0, item, None);

        assert_eq!(post.author, "Jo");
        assert_eq!(post.image, None);
    }

    #[test]
    fn truncates_description() {
        let mut item = item();
        item.description = format!("<p>{}</p>", "a".repeat(250));

        let post = assembler().assemble(0, item, None);
        assert_eq!(post.description, format!("{}...", "a".repeat(200)));

        let mut item = self::item();
        item.description = format!("<div><p>{}</p></div>", "b".repeat(150));

        let post = assembler().assemble(0, item, None);
        assert_eq!(post.description, "b".repeat(150));
    }

    #[test]
    fn unparseable_date() {
        let mut item = item();
        item.pub_date = "someday".into();

        let post = assembler().assemble(7, item, None);

        assert_eq!(post.id, "blog-7");
        assert_eq!(post.date, "");
    }

    #[test]
    fn local_offset_and_custom_format() {
        let assembler = PostAssembler {
            date_format: Some(
                time::format_description::parse_owned::<2>("[year]-[month]-[day]").unwrap(),
            ),
            offset: UtcOffset::from_hms(-11, 0, 0).unwrap(),
            ..assembler()
        };

        let post = assembler.assemble(0, item(), None);
        assert_eq!(post.date, "2024-01-14");
    }
}
