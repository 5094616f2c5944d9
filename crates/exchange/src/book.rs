//! Order book index.
//!
//! Offers are organized per (selling, buying) asset pair in a `BTreeMap`
//! sorted by price and then by ascending offer id, so best-offer selection
//! is an O(log n) lookup and — critically — fully deterministic: price ties
//! always resolve to the older offer. Price ordering cross-multiplies in
//! 128-bit integers; the engine never compares prices through floating
//! point.

use std::collections::{BTreeMap, HashMap};

use meridian_common::{AccountId, Asset, OfferEntry, Price};

/// Sort key for an offer within one pair's book: price value ascending,
/// then offer id ascending.
#[derive(Debug, Clone, Copy)]
pub struct OfferDescriptor {
    /// Offer price as an n/d ratio.
    pub price: Price,
    /// Unique offer identifier.
    pub offer_id: i64,
}

impl OfferDescriptor {
    /// Build the descriptor for an offer entry.
    pub fn from_offer(offer: &OfferEntry) -> Self {
        Self {
            price: offer.price,
            offer_id: offer.offer_id,
        }
    }
}

impl Ord for OfferDescriptor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.price
            .cmp_value(&other.price)
            .then(self.offer_id.cmp(&other.offer_id))
    }
}

impl PartialOrd for OfferDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Equality must agree with `Ord`: prices of equal value (1/2 vs 2/4) with
// the same offer id compare equal.
impl PartialEq for OfferDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for OfferDescriptor {}

/// Primary key of an offer in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OfferKey {
    /// The offer's seller.
    pub seller: AccountId,
    /// The offer id.
    pub offer_id: i64,
}

impl OfferKey {
    /// Key for an offer entry.
    pub fn from_offer(offer: &OfferEntry) -> Self {
        Self {
            seller: offer.seller,
            offer_id: offer.offer_id,
        }
    }
}

/// Asset pair identifying one side of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetPair {
    /// Asset the offers sell.
    pub selling: Asset,
    /// Asset the offers buy.
    pub buying: Asset,
}

type PairBook = BTreeMap<OfferDescriptor, OfferKey>;

/// Index of all resting offers, organized by asset pair.
///
/// Kept in lockstep with offer storage by [`LedgerState`](crate::LedgerState):
/// every insert, update, and delete goes through both.
#[derive(Debug, Clone, Default)]
pub struct OrderBookIndex {
    books: HashMap<AssetPair, PairBook>,
    // Reverse index for O(log n) removal.
    locations: HashMap<OfferKey, (AssetPair, OfferDescriptor)>,
}

impl OrderBookIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an offer to the index.
    pub fn add_offer(&mut self, offer: &OfferEntry) {
        let key = OfferKey::from_offer(offer);
        let descriptor = OfferDescriptor::from_offer(offer);
        let pair = AssetPair {
            selling: offer.selling,
            buying: offer.buying,
        };

        self.books.entry(pair).or_default().insert(descriptor, key);
        self.locations.insert(key, (pair, descriptor));
    }

    /// Remove an offer from the index.
    pub fn remove_offer(&mut self, seller: &AccountId, offer_id: i64) {
        let key = OfferKey {
            seller: *seller,
            offer_id,
        };
        if let Some((pair, descriptor)) = self.locations.remove(&key) {
            if let Some(book) = self.books.get_mut(&pair) {
                book.remove(&descriptor);
                if book.is_empty() {
                    self.books.remove(&pair);
                }
            }
        }
    }

    /// Update an offer in place (handles price or pair changes).
    pub fn update_offer(&mut self, offer: &OfferEntry) {
        self.remove_offer(&offer.seller, offer.offer_id);
        self.add_offer(offer);
    }

    /// The key of the lowest-priced offer selling `selling` for `buying`,
    /// ties broken by ascending offer id.
    pub fn best_offer_key(&self, selling: &Asset, buying: &Asset) -> Option<OfferKey> {
        let pair = AssetPair {
            selling: *selling,
            buying: *buying,
        };
        self.books
            .get(&pair)
            .and_then(|book| book.first_key_value())
            .map(|(_, key)| *key)
    }

    /// Iterate the keys of all offers for a pair, best price first.
    pub fn offers_for_pair(
        &self,
        selling: &Asset,
        buying: &Asset,
    ) -> impl Iterator<Item = &OfferKey> {
        let pair = AssetPair {
            selling: *selling,
            buying: *buying,
        };
        self.books
            .get(&pair)
            .into_iter()
            .flat_map(|book| book.values())
    }

    /// Whether any offer rests on the given pair.
    pub fn has_offers(&self, selling: &Asset, buying: &Asset) -> bool {
        let pair = AssetPair {
            selling: *selling,
            buying: *buying,
        };
        self.books.get(&pair).is_some_and(|book| !book.is_empty())
    }

    /// Total number of indexed offers.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
