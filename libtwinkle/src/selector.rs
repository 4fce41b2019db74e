//! Fragment selection policies
//!
//! Two policies over a `FragmentSet` snapshot: caller-supplied 1-based
//! indexes, and uniform random choice per enabled category. An invalid
//! index spoils only its own slot; a post is rejected only when no
//! text fragment at all survives selection.

use rand::seq::SliceRandom;
use tracing::warn;

use crate::error::{Result, SelectionError, TwinkleError};
use crate::types::{Deal, FragmentSet};

/// The outcome of one selection round, input to the composer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub quote: Option<String>,
    pub text: Option<String>,
    pub symbol: Option<String>,
    pub deal: Option<Deal>,
    pub picture: Option<String>,
}

/// 1-based index picks, one per category. `None` means "no pick".
#[derive(Debug, Clone, Default)]
pub struct IndexPicks {
    pub quote: Option<usize>,
    pub text: Option<usize>,
    pub symbol: Option<usize>,
    pub deal: Option<usize>,
    pub picture: Option<usize>,
}

/// Categories enabled for random selection.
#[derive(Debug, Clone, Copy)]
pub struct CategoryFilter {
    pub quotes: bool,
    pub texts: bool,
    pub symbols: bool,
    pub pictures: bool,
    pub deals: bool,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        // Deals are opt-in, everything else participates
        Self {
            quotes: true,
            texts: true,
            symbols: true,
            pictures: true,
            deals: false,
        }
    }
}

impl CategoryFilter {
    pub fn all() -> Self {
        Self {
            quotes: true,
            texts: true,
            symbols: true,
            pictures: true,
            deals: true,
        }
    }
}

/// Select fragments by explicit 1-based indexes.
///
/// An out-of-range index yields a warning and an empty slot rather
/// than aborting the round. Fails with `EmptyCatalog` when the
/// snapshot has no text fragments at all, or with the first index
/// error when the picks leave nothing to compose.
pub fn select_by_index(set: &FragmentSet, picks: &IndexPicks) -> Result<Selection> {
    if set.is_empty() {
        return Err(SelectionError::EmptyCatalog.into());
    }

    let mut first_issue: Option<SelectionError> = None;
    let mut resolve = |category: &'static str, items: &[String], index: Option<usize>| {
        match pick_index(category, items, index) {
            Ok(value) => value,
            Err(e) => {
                warn!("{}", e);
                first_issue.get_or_insert(e);
                None
            }
        }
    };

    let quote = resolve("quotes", &set.quotes, picks.quote);
    let text = resolve("texts", &set.texts, picks.text);
    let symbol = resolve("symbols", &set.symbols, picks.symbol);

    let deal = match pick_index_of(&set.deals, picks.deal) {
        Ok(value) => value.cloned(),
        Err(index) => {
            warn!(
                "Invalid selection for deals: index {} out of 1..={}",
                index,
                set.deals.len()
            );
            None
        }
    };
    let picture = match pick_index_of(&set.pictures, picks.picture) {
        Ok(value) => value.cloned(),
        Err(index) => {
            warn!(
                "Invalid selection for pictures: index {} out of 1..={}",
                index,
                set.pictures.len()
            );
            None
        }
    };

    if quote.is_none() && text.is_none() && symbol.is_none() {
        return match first_issue {
            Some(issue) => Err(issue.into()),
            None => Err(TwinkleError::InvalidInput(
                "Select at least one quote, text or symbol".to_string(),
            )),
        };
    }

    Ok(Selection {
        quote,
        text,
        symbol,
        deal,
        picture,
    })
}

/// Select one random fragment per enabled category.
///
/// Empty categories simply contribute nothing; only when every
/// enabled category is empty does selection fail with `EmptyCatalog`.
pub fn select_random(set: &FragmentSet, filter: &CategoryFilter) -> Result<Selection> {
    let mut rng = rand::thread_rng();

    let pools: [(bool, usize); 5] = [
        (filter.quotes, set.quotes.len()),
        (filter.texts, set.texts.len()),
        (filter.symbols, set.symbols.len()),
        (filter.pictures, set.pictures.len()),
        (filter.deals, set.deals.len()),
    ];
    if pools.iter().all(|(enabled, len)| !enabled || *len == 0) {
        return Err(SelectionError::EmptyCatalog.into());
    }

    let choose = |enabled: bool, items: &[String], rng: &mut rand::rngs::ThreadRng| {
        if enabled {
            items.choose(rng).cloned()
        } else {
            None
        }
    };

    Ok(Selection {
        quote: choose(filter.quotes, &set.quotes, &mut rng),
        text: choose(filter.texts, &set.texts, &mut rng),
        symbol: choose(filter.symbols, &set.symbols, &mut rng),
        deal: if filter.deals {
            set.deals.choose(&mut rng).cloned()
        } else {
            None
        },
        picture: choose(filter.pictures, &set.pictures, &mut rng),
    })
}

fn pick_index(
    category: &'static str,
    items: &[String],
    index: Option<usize>,
) -> std::result::Result<Option<String>, SelectionError> {
    let Some(index) = index else {
        return Ok(None);
    };
    if index == 0 || index > items.len() {
        return Err(SelectionError::InvalidSelection {
            category,
            index,
            len: items.len(),
        });
    }
    Ok(Some(items[index - 1].clone()))
}

/// Like `pick_index` but for non-string slots; returns the bad index
/// on failure so callers can log it.
fn pick_index_of<T>(items: &[T], index: Option<usize>) -> std::result::Result<Option<&T>, usize> {
    let Some(index) = index else {
        return Ok(None);
    };
    if index == 0 || index > items.len() {
        return Err(index);
    }
    Ok(Some(&items[index - 1]))
}
