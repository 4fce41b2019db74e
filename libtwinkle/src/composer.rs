//! Deal composer: selection in, immutable post out
//!
//! Composition is deterministic; any randomness happened upstream in
//! selection. The body is the non-empty text fragments joined by a
//! single space in quote, text, symbol order, with an optional
//! promotional block appended verbatim.

use crate::selector::Selection;
use crate::types::{ComposedPost, Deal};

/// Compose a post from a selection round.
pub fn compose(selection: &Selection) -> ComposedPost {
    let mut body = [
        selection.quote.as_deref(),
        selection.text.as_deref(),
        selection.symbol.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join(" ");

    if let Some(deal) = &selection.deal {
        body.push_str(&deal_block(deal));
    }

    ComposedPost {
        body,
        deal: selection.deal.clone(),
        picture: selection.picture.clone(),
        created_at: chrono::Utc::now().timestamp(),
    }
}

/// The fixed promotional template. Ends with a hashtag derived from
/// the product name.
fn deal_block(deal: &Deal) -> String {
    format!(
        "\n\n🔥 Deal: {} for {} ({} off)\n{}\n{}",
        deal.product,
        deal.price,
        deal.discount,
        deal.link,
        deal.hashtag()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold_ring_deal() -> Deal {
        Deal {
            product: "Gold Ring".into(),
            price: "$99".into(),
            discount: "10%".into(),
            link: "http://x/1".into(),
        }
    }

    #[test]
    fn test_full_composition_scenario() {
        let selection = Selection {
            quote: Some("Shine on".into()),
            text: Some("New arrival".into()),
            symbol: Some("✨".into()),
            deal: Some(gold_ring_deal()),
            picture: Some("ring1.jpg".into()),
        };
        let post = compose(&selection);

        assert!(post.body.starts_with("Shine on New arrival ✨"));
        assert!(post.body.contains("Gold Ring"));
        assert!(post.body.contains("$99"));
        assert!(post.body.contains("10%"));
        assert!(post.body.contains("http://x/1"));
        assert!(post.body.ends_with("#GoldRing"));
        assert_eq!(post.picture.as_deref(), Some("ring1.jpg"));
        assert_eq!(post.deal, Some(gold_ring_deal()));
    }

    #[test]
    fn test_absent_fragments_are_skipped() {
        let selection = Selection {
            quote: Some("Shine on".into()),
            text: None,
            symbol: Some("✨".into()),
            deal: None,
            picture: None,
        };
        let post = compose(&selection);
        assert_eq!(post.body, "Shine on ✨");
        assert!(post.deal.is_none());
        assert!(post.picture.is_none());
    }

    #[test]
    fn test_empty_string_fragments_do_not_double_spaces() {
        let selection = Selection {
            quote: Some("".into()),
            text: Some("New arrival".into()),
            symbol: None,
            deal: None,
            picture: None,
        };
        let post = compose(&selection);
        assert_eq!(post.body, "New arrival");
    }

    #[test]
    fn test_composition_is_deterministic() {
        let selection = Selection {
            quote: Some("Shine on".into()),
            text: Some("New arrival".into()),
            symbol: Some("✨".into()),
            deal: Some(gold_ring_deal()),
            picture: None,
        };
        let a = compose(&selection);
        let b = compose(&selection);
        assert_eq!(a.body, b.body);
    }

    #[test]
    fn test_deal_only_post() {
        let selection = Selection {
            quote: None,
            text: Some("Weekend special".into()),
            symbol: None,
            deal: Some(gold_ring_deal()),
            picture: None,
        };
        let post = compose(&selection);
        assert!(post.body.starts_with("Weekend special\n\n"));
        assert!(post.body.ends_with("#GoldRing"));
    }

    #[test]
    fn test_picture_passes_through_as_reference() {
        let selection = Selection {
            quote: Some("Shine on".into()),
            picture: Some("ring2.png".into()),
            ..Default::default()
        };
        let post = compose(&selection);
        assert_eq!(post.picture.as_deref(), Some("ring2.png"));
        assert!(!post.body.contains("ring2.png"));
    }
}
