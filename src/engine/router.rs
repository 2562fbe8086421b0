use std::collections::{BTreeMap, BTreeSet};

use crate::model::Platform;
use crate::model::book::{Direction, Orderbook};
use crate::model::round_dp;
use crate::model::route::{Fill, PlatformAllocation, Route};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RouteError {
    #[error("budget must be > 0")]
    EmptyBudget,
    #[error("no liquidity available")]
    NoLiquidity,
}

#[derive(Debug, Clone, Copy)]
struct TaggedLevel {
    platform: Platform,
    price: f64,
    price_cents: f64,
    size: f64,
}

struct Walk {
    direction: Direction,
    remaining: f64,
    used: BTreeSet<Platform>,
    fills: Vec<Fill>,
    per_platform: BTreeMap<Platform, (f64, f64)>,
}

impl Walk {
    fn consume(&mut self, level: &TaggedLevel) {
        if self.remaining <= 0.0 || level.price <= 0.0 {
            return;
        }
        let available_cost = level.price * level.size;
        let (spend, qty) = match self.direction {
            Direction::Buy => {
                let spend = self.remaining.min(available_cost);
                (spend, spend / level.price)
            }
            Direction::Sell => {
                let qty = self.remaining.min(level.size);
                (qty * level.price, qty)
            }
        };
        if qty <= 0.0 {
            return;
        }
        self.fills.push(Fill {
            platform: level.platform,
            price: level.price,
            price_cents: level.price_cents,
            size: round_dp(qty, 4),
            cost: round_dp(spend, 4),
        });
        let entry = self.per_platform.entry(level.platform).or_insert((0.0, 0.0));
        entry.0 += spend;
        entry.1 += qty;
        self.used.insert(level.platform);
        self.remaining -= match self.direction {
            Direction::Buy => spend,
            Direction::Sell => qty,
        };
    }
}

/// Split a budget across venue books.
///
/// Walk the consolidated levels in price order (asks low→high for buys, bids
/// high→low for sells). Within a group of equal-priced levels, liquidity from
/// venues already holding a fill is taken first; only if budget remains is a
/// single untouched venue opened — the one with the largest notional at that
/// price — so the number of venues an order touches stays minimal. Ties fall
/// back to the deeper remaining book, then the venue name.
pub fn find_optimal_route(
    books: &[Orderbook],
    budget: f64,
    direction: Direction,
) -> Result<Route, RouteError> {
    if budget <= 0.0 {
        return Err(RouteError::EmptyBudget);
    }

    let mut levels: Vec<TaggedLevel> = Vec::new();
    let mut book_depth: BTreeMap<Platform, f64> = BTreeMap::new();
    for book in books {
        let side = match direction {
            Direction::Buy => &book.asks,
            Direction::Sell => &book.bids,
        };
        for level in side {
            levels.push(TaggedLevel {
                platform: book.platform,
                price: level.price,
                price_cents: level.price_cents,
                size: level.size,
            });
            *book_depth.entry(book.platform).or_default() += level.price * level.size;
        }
    }
    if levels.is_empty() {
        return Err(RouteError::NoLiquidity);
    }

    match direction {
        Direction::Buy => levels.sort_by(|a, b| a.price.total_cmp(&b.price)),
        Direction::Sell => levels.sort_by(|a, b| b.price.total_cmp(&a.price)),
    }

    let mut walk = Walk {
        direction,
        remaining: budget,
        used: BTreeSet::new(),
        fills: Vec::new(),
        per_platform: BTreeMap::new(),
    };

    let mut i = 0;
    while i < levels.len() && walk.remaining > 0.0 {
        let price = levels[i].price;
        let mut j = i;
        while j < levels.len() && levels[j].price == price {
            j += 1;
        }
        let group = &levels[i..j];

        // Venues already in the route first, in level order.
        let existing: Vec<_> = group
            .iter()
            .filter(|l| walk.used.contains(&l.platform))
            .collect();
        for level in existing {
            walk.consume(level);
        }

        // If budget remains, open exactly one new venue at this price — the
        // one with the largest notional here. Leftover budget carries into
        // the next price group rather than fanning out further.
        if walk.remaining > 0.0 {
            let mut notional: BTreeMap<Platform, f64> = BTreeMap::new();
            for level in group.iter().filter(|l| !walk.used.contains(&l.platform)) {
                *notional.entry(level.platform).or_default() += level.price * level.size;
            }
            let best = notional.iter().max_by(|a, b| {
                a.1.total_cmp(b.1)
                    .then_with(|| book_depth[a.0].total_cmp(&book_depth[b.0]))
                    .then_with(|| b.0.as_str().cmp(a.0.as_str()))
            });
            if let Some((&best, _)) = best {
                for level in group.iter().filter(|l| l.platform == best) {
                    walk.consume(level);
                }
            }
        }

        i = j;
    }

    let total_spent: f64 = walk.per_platform.values().map(|v| v.0).sum();
    let total_qty: f64 = walk.per_platform.values().map(|v| v.1).sum();
    let avg_price = if total_qty > 0.0 { total_spent / total_qty } else { 0.0 };

    let per_platform = walk
        .per_platform
        .iter()
        .map(|(&platform, &(spent, qty))| {
            let avg = if qty > 0.0 { spent / qty } else { 0.0 };
            (
                platform,
                PlatformAllocation {
                    spent: round_dp(spent, 4),
                    qty: round_dp(qty, 4),
                    avg_price: round_dp(avg, 6),
                    avg_price_cents: round_dp(avg * 100.0, 2),
                    market: None,
                    token: None,
                },
            )
        })
        .collect();

    Ok(Route {
        direction,
        budget,
        total_spent: round_dp(total_spent, 4),
        total_qty: round_dp(total_qty, 4),
        avg_price: round_dp(avg_price, 6),
        avg_price_cents: round_dp(avg_price * 100.0, 2),
        unfilled: round_dp(walk.remaining.max(0.0), 4),
        platforms_used: walk.per_platform.len(),
        per_platform,
        fills: walk.fills,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::book::{Level, Side};

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
    fn rejects_empty_budget_and_empty_books() {
        let b = book(Platform::Limitless, &[(0.5, 10.0)], &[]);
        assert_eq!(
            find_optimal_route(std::slice::from_ref(&b), 0.0, Direction::Buy),
            Err(RouteError::EmptyBudget)
        );
        assert_eq!(
            find_optimal_route(&[], 5.0, Direction::Buy),
            Err(RouteError::NoLiquidity)
        );
        // a book with only bids has no buy liquidity
        let bids_only = book(Platform::Limitless, &[], &[(0.5, 10.0)]);
        assert_eq!(
            find_optimal_route(&[bids_only], 5.0, Direction::Buy),
            Err(RouteError::NoLiquidity)
        );
    }

    #[test]
    fn buy_walks_asks_cheapest_first() {
        let a = book(Platform::Polymarket, &[(0.60, 100.0)], &[]);
        let b = book(Platform::Limitless, &[(0.50, 10.0)], &[]);
        let route = find_optimal_route(&[a, b], 8.0, Direction::Buy).unwrap();

        // 10 shares @ 0.50 = $5 on limitless, then $3 @ 0.60 on polymarket
        assert_eq!(route.fills[0].platform, Platform::Limitless);
        assert_eq!(route.fills[0].cost, 5.0);
        assert_eq!(route.fills[1].platform, Platform::Polymarket);
        assert_eq!(route.fills[1].cost, 3.0);
        assert_eq!(route.total_spent, 8.0);
        assert_eq!(route.unfilled, 0.0);
        assert_eq!(route.platforms_used, 2);
        // prices nondecreasing along the fill order
        assert!(route.fills.windows(2).all(|w| w[0].price <= w[1].price));
    }

    #[test]
    fn accounting_invariants_hold() {
        let a = book(Platform::Polymarket, &[(0.40, 30.0), (0.45, 30.0)], &[]);
        let b = book(Platform::Opinion, &[(0.42, 50.0)], &[]);
        let route = find_optimal_route(&[a, b], 37.0, Direction::Buy).unwrap();

        let fill_cost: f64 = route.fills.iter().map(|f| f.cost).sum();
        let fill_qty: f64 = route.fills.iter().map(|f| f.size).sum();
        assert!((route.total_spent - round_dp(fill_cost, 4)).abs() < 1e-6);
        assert!((route.total_qty - round_dp(fill_qty, 4)).abs() < 1e-6);
        assert!(route.total_spent <= route.budget + 1e-9);
        assert!((route.unfilled - (route.budget - route.total_spent)).abs() < 1e-4);
    }

    #[test]
    fn sell_walks_bids_highest_first_in_shares() {
        let a = book(Platform::Polymarket, &[], &[(0.55, 10.0)]);
        let b = book(Platform::Limitless, &[], &[(0.60, 5.0)]);
        let route = find_optimal_route(&[a, b], 12.0, Direction::Sell).unwrap();

        assert_eq!(route.fills[0].platform, Platform::Limitless);
        assert_eq!(route.fills[0].size, 5.0);
        assert_eq!(route.fills[1].platform, Platform::Polymarket);
        assert_eq!(route.fills[1].size, 7.0);
        // budget is shares for sells
        assert_eq!(route.total_qty, 12.0);
        assert_eq!(route.unfilled, 0.0);
        assert!((route.total_spent - (5.0 * 0.60 + 7.0 * 0.55)).abs() < 1e-9);
    }

    #[test]
    fn equal_price_prefers_already_used_venue() {
        // cheapest level opens polymarket; at 0.50 both venues quote, and the
        // walk must drain polymarket before touching limitless
        let a = book(Platform::Polymarket, &[(0.45, 2.0), (0.50, 10.0)], &[]);
        let b = book(Platform::Limitless, &[(0.50, 100.0)], &[]);
        let route = find_optimal_route(&[a, b], 4.0, Direction::Buy).unwrap();

        // 2 @ 0.45 = 0.90, then 3.10 @ 0.50 from polymarket's 10-share level
        assert_eq!(route.platforms_used, 1);
        assert!(route.per_platform.contains_key(&Platform::Polymarket));
    }

    #[test]
    fn single_new_venue_with_largest_notional_wins() {
        // equal best-ask price, different notional; budget eats one level
        let a = book(Platform::Polymarket, &[(0.50, 10.0)], &[]);
        let b = book(Platform::Limitless, &[(0.50, 40.0)], &[]);
        let route = find_optimal_route(&[a, b], 5.0, Direction::Buy).unwrap();

        assert_eq!(route.platforms_used, 1);
        assert!(route.per_platform.contains_key(&Platform::Limitless));
    }

    #[test]
    fn only_one_new_venue_opens_per_price_group() {
        // three venues at the same price ($3, $10, $8 of notional) and a $15
        // budget: only the $10 venue opens at this price; the remaining $5
        // carries into the next price group instead of draining the $8 venue
        let a = book(Platform::Polymarket, &[(0.50, 6.0)], &[]);
        let b = book(Platform::Limitless, &[(0.50, 20.0), (0.60, 20.0)], &[]);
        let c = book(Platform::Opinion, &[(0.50, 16.0)], &[]);
        let route = find_optimal_route(&[a, b, c], 15.0, Direction::Buy).unwrap();

        assert_eq!(route.platforms_used, 1);
        assert!(route.per_platform.contains_key(&Platform::Limitless));
        assert_eq!(route.fills.len(), 2);
        assert_eq!(route.fills[0].cost, 10.0);
        assert_eq!(route.fills[0].price, 0.50);
        assert_eq!(route.fills[1].cost, 5.0);
        assert_eq!(route.fills[1].price, 0.60);
        assert_eq!(route.total_spent, 15.0);
        assert_eq!(route.unfilled, 0.0);
    }

    #[test]
    fn notional_tie_breaks_on_deeper_book_then_name() {
        // identical notional at the shared best ask; limitless has the deeper
        // next level so it wins the tie
        let a = book(Platform::Polymarket, &[(0.50, 20.0), (0.60, 5.0)], &[]);
        let b = book(Platform::Limitless, &[(0.50, 20.0), (0.60, 50.0)], &[]);
        let route = find_optimal_route(&[a, b], 10.0, Direction::Buy).unwrap();
        assert_eq!(route.platforms_used, 1);
        assert!(route.per_platform.contains_key(&Platform::Limitless));

        // exactly tied books: stable fallback on the venue identifier
        let a = book(Platform::Polymarket, &[(0.50, 20.0)], &[]);
        let b = book(Platform::Limitless, &[(0.50, 20.0)], &[]);
        let route = find_optimal_route(&[a, b], 10.0, Direction::Buy).unwrap();
        assert_eq!(route.platforms_used, 1);
        assert!(route.per_platform.contains_key(&Platform::Limitless));
    }

    #[test]
    fn budget_exceeding_liquidity_reports_unfilled() {
        let a = book(Platform::Opinion, &[(0.50, 10.0)], &[]);
        let route = find_optimal_route(&[a], 20.0, Direction::Buy).unwrap();
        assert_eq!(route.total_spent, 5.0);
        assert_eq!(route.unfilled, 15.0);
    }
}
