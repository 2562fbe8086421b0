use serde::{Deserialize, Serialize};

use super::{Platform, round_dp};

/// The two outcomes of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn flipped(&self) -> Side {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" => Ok(Side::Yes),
            "no" => Ok(Side::No),
            other => Err(format!("unknown side '{other}'")),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Yes => f.write_str("yes"),
            Side::No => f.write_str("no"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => f.write_str("buy"),
            Direction::Sell => f.write_str("sell"),
        }
    }
}

/// One price level. Price is a decimal in (0, 1); size and total are in the
/// venue's quote-stablecoin units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub size: f64,
    pub price_cents: f64,
    pub total: f64,
}

impl Level {
    pub fn new(price: f64, size: f64) -> Self {
        Level {
            price,
            size,
            price_cents: round_dp(price * 100.0, 1),
            total: round_dp(price * size, 2),
        }
    }
}

/// A single venue's book for one (outcome, side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orderbook {
    pub platform: Platform,
    pub outcome: String,
    pub side: Side,
    /// Ascending by price.
    pub asks: Vec<Level>,
    /// Descending by price.
    pub bids: Vec<Level>,
    pub best_ask_cents: f64,
    pub best_bid_cents: f64,
}

impl Orderbook {
    /// Sorts levels into canonical order and derives the best-price fields.
    pub fn new(
        platform: Platform,
        outcome: impl Into<String>,
        side: Side,
        mut asks: Vec<Level>,
        mut bids: Vec<Level>,
    ) -> Self {
        asks.sort_by(|a, b| a.price.total_cmp(&b.price));
        bids.sort_by(|a, b| b.price.total_cmp(&a.price));
        let best_ask_cents = asks.first().map(|l| l.price_cents).unwrap_or(0.0);
        let best_bid_cents = bids.first().map(|l| l.price_cents).unwrap_or(0.0);
        Orderbook {
            platform,
            outcome: outcome.into(),
            side,
            asks,
            bids,
            best_ask_cents,
            best_bid_cents,
        }
    }

    /// Synthesize the opposite side of a single-sided book: a yes-ask at p is
    /// a no-bid at 1-p with the same size, and vice versa.
    pub fn reflected(&self) -> Orderbook {
        let asks = self
            .bids
            .iter()
            .map(|l| Level::new(1.0 - l.price, l.size))
            .collect();
        let bids = self
            .asks
            .iter()
            .map(|l| Level::new(1.0 - l.price, l.size))
            .collect();
        Orderbook::new(self.platform, self.outcome.clone(), self.side.flipped(), asks, bids)
    }

    /// BUY reads the top of the asks, SELL the top of the bids. Empty books
    /// report a zero offer rather than an error.
    pub fn best_offer(&self, direction: Direction) -> BestOffer {
        let top = match direction {
            Direction::Buy => self.asks.first(),
            Direction::Sell => self.bids.first(),
        };
        match top {
            Some(l) => BestOffer { price: l.price, size: l.size },
            None => BestOffer { price: 0.0, size: 0.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestOffer {
    pub price: f64,
    pub size: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yes_book() -> Orderbook {
        Orderbook::new(
            Platform::Limitless,
            "home",
            Side::Yes,
            vec![Level::new(0.55, 100.0), Level::new(0.52, 40.0)],
            vec![Level::new(0.48, 80.0), Level::new(0.50, 20.0)],
        )
    }

    #[test]
    fn levels_sort_into_canonical_order() {
        let book = yes_book();
        assert_eq!(book.asks[0].price, 0.52);
        assert_eq!(book.bids[0].price, 0.50);
        assert_eq!(book.best_ask_cents, 52.0);
        assert_eq!(book.best_bid_cents, 50.0);
    }

    #[test]
    fn best_offer_reads_direction_appropriate_top() {
        let book = yes_book();
        assert_eq!(book.best_offer(Direction::Buy).price, 0.52);
        assert_eq!(book.best_offer(Direction::Sell).price, 0.50);

        let empty = Orderbook::new(Platform::Opinion, "home", Side::Yes, vec![], vec![]);
        assert_eq!(empty.best_offer(Direction::Buy), BestOffer { price: 0.0, size: 0.0 });
    }

    #[test]
    fn reflection_is_an_involution() {
        let book = yes_book();
        let twice = book.reflected().reflected();
        assert_eq!(twice.side, Side::Yes);
        let prices = |b: &Orderbook| {
            (
                b.asks.iter().map(|l| (l.price, l.size)).collect::<Vec<_>>(),
                b.bids.iter().map(|l| (l.price, l.size)).collect::<Vec<_>>(),
            )
        };
        assert_eq!(prices(&book), prices(&twice));
    }

    #[test]
    fn reflection_swaps_bid_ask_and_mirrors_price() {
        let no = yes_book().reflected();
        assert_eq!(no.side, Side::No);
        // yes-bid 0.50 becomes the best no-ask at 0.50
        assert_eq!(no.asks[0].price, 0.50);
        assert_eq!(no.asks[0].size, 20.0);
        // yes-ask 0.52 becomes the best no-bid at 0.48
        assert_eq!(no.bids[0].price, 0.48);
    }
}
