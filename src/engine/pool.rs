use serde::{Deserialize, Serialize};

use crate::model::book::{Level, Orderbook};
use crate::model::round_dp;

/// Number of 0.1-cent buckets on the price grid: keys 1..=999 cover
/// (0.000, 1.000) exclusive.
const GRID_BUCKETS: usize = 999;

/// One level of the pooled book. The venue origin of each unit is lost —
/// routing goes back to the raw per-venue books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledLevel {
    pub price: f64,
    pub size: f64,
    pub total: f64,
    pub price_cents: f64,
    /// Running sum of `total` in emitted order.
    pub cumsum: f64,
}

fn grid_key(price_cents: f64) -> Option<usize> {
    let key = (price_cents * 10.0).round() as i64;
    (1..=GRID_BUCKETS as i64).contains(&key).then_some(key as usize)
}

/// Sum sizes across books onto the fixed grid. Returns the grid indexed by
/// key; only nonempty buckets are emitted by the callers below.
fn pool_onto_grid<'a>(levels: impl Iterator<Item = &'a Level>) -> Vec<f64> {
    let mut grid = vec![0.0; GRID_BUCKETS + 1];
    for level in levels {
        if let Some(key) = grid_key(level.price_cents) {
            grid[key] += level.size;
        }
    }
    grid
}

fn emit(grid: &[f64], keys: impl Iterator<Item = usize>) -> Vec<PooledLevel> {
    let mut cumsum = 0.0;
    let mut out = Vec::new();
    for key in keys {
        if grid[key] <= 0.0 {
            continue;
        }
        let price_cents = key as f64 / 10.0;
        let price = price_cents / 100.0;
        let size = round_dp(grid[key], 2);
        let total = round_dp(price * size, 2);
        cumsum += total;
        out.push(PooledLevel {
            price: round_dp(price, 4),
            size,
            total,
            price_cents: round_dp(price_cents, 1),
            cumsum: round_dp(cumsum, 2),
        });
    }
    out
}

/// Pooled asks in ascending price order.
pub fn pool_asks(books: &[&Orderbook]) -> Vec<PooledLevel> {
    let grid = pool_onto_grid(books.iter().flat_map(|b| b.asks.iter()));
    emit(&grid, 1..=GRID_BUCKETS)
}

/// Pooled bids in descending price order. The cumsum runs from the best bid
/// down, matching how the sell side is consumed.
pub fn pool_bids(books: &[&Orderbook]) -> Vec<PooledLevel> {
    let grid = pool_onto_grid(books.iter().flat_map(|b| b.bids.iter()));
    emit(&grid, (1..=GRID_BUCKETS).rev())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Platform;
    use crate::model::book::Side;

    fn book(platform: Platform, asks: &[(f64, f64)], bids: &[(f64, f64)]) -> Orderbook {
        Orderbook::new(
            platform,
            "home",
            Side::Yes,
            asks.iter().map(|&(p, s)| Level::new(p, s)).collect(),
            bids.iter().map(|&(p, s)| Level::new(p, s)).collect(),
        )
    }

    #[test]
    fn sizes_sum_across_books_at_equal_price() {
        let a = book(Platform::Polymarket, &[(0.52, 100.0), (0.55, 50.0)], &[]);
        let b = book(Platform::Limitless, &[(0.52, 40.0)], &[]);
        let pooled = pool_asks(&[&a, &b]);

        assert_eq!(pooled.len(), 2);
        assert_eq!(pooled[0].price_cents, 52.0);
        assert_eq!(pooled[0].size, 140.0);
        assert_eq!(pooled[1].price_cents, 55.0);
        assert_eq!(pooled[1].size, 50.0);
    }

    #[test]
    fn output_is_monotone_and_cumsum_nondecreasing() {
        let a = book(
            Platform::Polymarket,
            &[(0.40, 10.0), (0.60, 10.0)],
            &[(0.35, 10.0), (0.30, 5.0)],
        );
        let b = book(Platform::Opinion, &[(0.50, 20.0)], &[(0.32, 8.0)]);

        let asks = pool_asks(&[&a, &b]);
        assert!(asks.windows(2).all(|w| w[0].price < w[1].price));
        assert!(asks.windows(2).all(|w| w[0].cumsum <= w[1].cumsum));

        let bids = pool_bids(&[&a, &b]);
        assert!(bids.windows(2).all(|w| w[0].price > w[1].price));
        assert!(bids.windows(2).all(|w| w[0].cumsum <= w[1].cumsum));
    }

    #[test]
    fn disjoint_books_concatenate() {
        let a = book(Platform::Polymarket, &[(0.40, 10.0)], &[]);
        let b = book(Platform::Limitless, &[(0.60, 20.0)], &[]);
        let pooled = pool_asks(&[&a, &b]);
        let singles: Vec<_> = pool_asks(&[&a])
            .into_iter()
            .chain(pool_asks(&[&b]))
            .collect();
        // cumsum differs by construction; compare the price/size shape
        let shape = |ls: &[PooledLevel]| {
            ls.iter().map(|l| (l.price_cents, l.size)).collect::<Vec<_>>()
        };
        assert_eq!(shape(&pooled), shape(&singles));
    }

    #[test]
    fn out_of_grid_prices_are_dropped() {
        // price 0 and 1 fall off the 1..=999 grid
        let a = book(Platform::Polymarket, &[(0.9999, 10.0)], &[]);
        let pooled = pool_asks(&[&a]);
        assert!(pooled.is_empty());
    }
}
