//! Maker/taker price selection
//!
//! The decision tree is an ordered table of rows. Each row names the side and
//! spread regime it applies to, a guard over the book and reference price, and
//! the quote it produces. The first row whose side, regime and guard match
//! wins, so rows can be tested one by one.

use tracing::info;

use crate::trading::errors::TradingError;
use crate::trading::orderbook::OrderBookSnapshot;
use crate::trading::rules::adjust_to_tick;

/// Default opposing-liquidity multiple for the wall test
pub const DEFAULT_WALL_RATIO: f64 = 3.0;

/// Spread classification relative to one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Tight,
    Wide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Maker,
    Taker,
}

/// Which price a row quotes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    Bid,
    Ask,
    /// One tick above the bid, kept below the ask
    BidPlusTick,
    /// One tick below the ask, kept above the bid
    AskMinusTick,
}

/// Everything a guard may look at
#[derive(Debug, Clone, PartialEq)]
pub struct PriceInputs {
    pub is_buy: bool,
    /// Price at which the upstream signal fired (K)
    pub reference_price: f64,
    pub book: OrderBookSnapshot,
    pub wall_ratio: f64,
}

impl PriceInputs {
    pub fn new(is_buy: bool, reference_price: f64, book: OrderBookSnapshot) -> Self {
        Self {
            is_buy,
            reference_price,
            book,
            wall_ratio: DEFAULT_WALL_RATIO,
        }
    }

    pub fn regime(&self) -> Regime {
        classify_regime(&self.book)
    }

    fn ask_wall(&self) -> bool {
        self.book.ask_qty > self.wall_ratio * self.book.bid_qty
    }

    fn bid_wall(&self) -> bool {
        self.book.bid_qty > self.wall_ratio * self.book.ask_qty
    }
}

pub fn classify_regime(book: &OrderBookSnapshot) -> Regime {
    let epsilon = book.tick_size * 1e-4;
    if book.spread() <= book.tick_size + epsilon {
        Regime::Tight
    } else {
        Regime::Wide
    }
}

/// One row of the decision table
#[derive(Clone, Copy)]
pub struct DecisionRow {
    pub name: &'static str,
    pub is_buy: bool,
    pub regime: Regime,
    pub guard: fn(&PriceInputs) -> bool,
    pub quote: Quote,
    pub role: Role,
}

impl std::fmt::Debug for DecisionRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionRow")
            .field("name", &self.name)
            .field("quote", &self.quote)
            .field("role", &self.role)
            .finish()
    }
}

impl DecisionRow {
    pub fn applies(&self, inputs: &PriceInputs) -> bool {
        self.is_buy == inputs.is_buy && self.regime == inputs.regime() && (self.guard)(inputs)
    }
}

fn always(_: &PriceInputs) -> bool {
    true
}

fn k_at_or_above_ask(i: &PriceInputs) -> bool {
    i.reference_price >= i.book.ask
}

fn k_at_or_above_bid(i: &PriceInputs) -> bool {
    i.reference_price >= i.book.bid
}

fn ask_wall(i: &PriceInputs) -> bool {
    i.ask_wall()
}

fn bid_wall(i: &PriceInputs) -> bool {
    i.bid_wall()
}

fn ask_heavier(i: &PriceInputs) -> bool {
    i.book.ask_qty > i.book.bid_qty
}

fn bid_heavier(i: &PriceInputs) -> bool {
    i.book.bid_qty > i.book.ask_qty
}

fn k_at_or_above_ask_with_ask_wall(i: &PriceInputs) -> bool {
    k_at_or_above_ask(i) && i.ask_wall()
}

fn k_at_or_above_bid_with_bid_wall(i: &PriceInputs) -> bool {
    k_at_or_above_bid(i) && i.bid_wall()
}

// Both K sub-branches of the tight buy case run the same wall test; K only
// selects which row (and trace label) fires.
pub const DECISION_TABLE: &[DecisionRow] = &[
    DecisionRow {
        name: "buy.tight.k_at_or_above_ask.ask_wall",
        is_buy: true,
        regime: Regime::Tight,
        guard: k_at_or_above_ask_with_ask_wall,
        quote: Quote::Bid,
        role: Role::Maker,
    },
    DecisionRow {
        name: "buy.tight.k_at_or_above_ask.cross",
        is_buy: true,
        regime: Regime::Tight,
        guard: k_at_or_above_ask,
        quote: Quote::Ask,
        role: Role::Taker,
    },
    DecisionRow {
        name: "buy.tight.k_below_ask.ask_wall",
        is_buy: true,
        regime: Regime::Tight,
        guard: ask_wall,
        quote: Quote::Bid,
        role: Role::Maker,
    },
    DecisionRow {
        name: "buy.tight.k_below_ask.cross",
        is_buy: true,
        regime: Regime::Tight,
        guard: always,
        quote: Quote::Ask,
        role: Role::Taker,
    },
    DecisionRow {
        name: "buy.wide.ask_wall",
        is_buy: true,
        regime: Regime::Wide,
        guard: ask_wall,
        quote: Quote::BidPlusTick,
        role: Role::Maker,
    },
    DecisionRow {
        name: "buy.wide.ask_heavier",
        is_buy: true,
        regime: Regime::Wide,
        guard: ask_heavier,
        quote: Quote::AskMinusTick,
        role: Role::Maker,
    },
    DecisionRow {
        name: "buy.wide.cross",
        is_buy: true,
        regime: Regime::Wide,
        guard: always,
        quote: Quote::Ask,
        role: Role::Taker,
    },
    DecisionRow {
        name: "sell.tight.k_at_or_above_bid.bid_wall",
        is_buy: false,
        regime: Regime::Tight,
        guard: k_at_or_above_bid_with_bid_wall,
        quote: Quote::Ask,
        role: Role::Maker,
    },
    DecisionRow {
        name: "sell.tight.k_at_or_above_bid.hit",
        is_buy: false,
        regime: Regime::Tight,
        guard: k_at_or_above_bid,
        quote: Quote::Bid,
        role: Role::Taker,
    },
    DecisionRow {
        name: "sell.tight.k_below_bid.hit",
        is_buy: false,
        regime: Regime::Tight,
        guard: always,
        quote: Quote::Bid,
        role: Role::Taker,
    },
    DecisionRow {
        name: "sell.wide.bid_wall",
        is_buy: false,
        regime: Regime::Wide,
        guard: bid_wall,
        quote: Quote::AskMinusTick,
        role: Role::Maker,
    },
    DecisionRow {
        name: "sell.wide.bid_heavier",
        is_buy: false,
        regime: Regime::Wide,
        guard: bid_heavier,
        quote: Quote::BidPlusTick,
        role: Role::Maker,
    },
    DecisionRow {
        name: "sell.wide.hit",
        is_buy: false,
        regime: Regime::Wide,
        guard: always,
        quote: Quote::Bid,
        role: Role::Taker,
    },
];

/// Chosen entry price with the row that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct PriceDecision {
    pub price: f64,
    pub role: Role,
    pub regime: Regime,
    pub rule: &'static str,
    pub trace: String,
}

/// Resolve a quote against the book, tick-aligned
pub fn resolve_quote(quote: Quote, book: &OrderBookSnapshot) -> f64 {
    let tick = book.tick_size;
    let raw = match quote {
        Quote::Bid => book.bid,
        Quote::Ask => book.ask,
        Quote::BidPlusTick => (book.bid + tick).min(book.ask - tick).max(book.bid),
        Quote::AskMinusTick => (book.ask - tick).max(book.bid + tick).min(book.ask),
    };
    adjust_to_tick(raw, tick)
}

/// Smart order router for entry prices
#[derive(Debug, Clone)]
pub struct PriceDecisionEngine {
    wall_ratio: f64,
}

impl Default for PriceDecisionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_WALL_RATIO)
    }
}

impl PriceDecisionEngine {
    pub fn new(wall_ratio: f64) -> Self {
        Self { wall_ratio }
    }

    /// Pure: identical inputs always give the same price and trace
    pub fn decide(
        &self,
        is_buy: bool,
        reference_price: f64,
        book: &OrderBookSnapshot,
    ) -> Result<PriceDecision, TradingError> {
        if !book.is_usable() {
            return Err(TradingError::InvalidBook {
                reason: format!("bid={} ask={} tick={}", book.bid, book.ask, book.tick_size),
            });
        }

        let inputs = PriceInputs {
            is_buy,
            reference_price,
            book: book.clone(),
            wall_ratio: self.wall_ratio,
        };
        let regime = inputs.regime();

        let row = DECISION_TABLE
            .iter()
            .find(|row| row.applies(&inputs))
            .ok_or_else(|| TradingError::MissingData {
                what: "no price rule matched".to_string(),
            })?;

        let price = resolve_quote(row.quote, book);
        let trace = format!(
            "{}: regime={:?} spread={:.8} ask={} ({}) bid={} ({}) K={} -> {:?} @ {}",
            row.name,
            regime,
            book.spread(),
            book.ask,
            book.ask_qty,
            book.bid,
            book.bid_qty,
            reference_price,
            row.role,
            price
        );

        Ok(PriceDecision {
            price,
            role: row.role,
            regime,
            rule: row.name,
            trace,
        })
    }

    /// `decide` plus an audit log line
    pub fn decide_logged(
        &self,
        symbol: &str,
        is_buy: bool,
        reference_price: f64,
        book: &OrderBookSnapshot,
    ) -> Result<PriceDecision, TradingError> {
        let decision = self.decide(is_buy, reference_price, book)?;
        info!("🧭 {} {} price: {}", symbol, if is_buy { "BUY" } else { "SELL" }, decision.trace);
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(ask: f64, bid: f64, ask_qty: f64, bid_qty: f64) -> OrderBookSnapshot {
        OrderBookSnapshot { ask, bid, ask_qty, bid_qty, tick_size: 0.01 }
    }

    fn row(name: &str) -> &'static DecisionRow {
        DECISION_TABLE.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_regime_boundary() {
        assert_eq!(classify_regime(&book(100.01, 100.00, 1.0, 1.0)), Regime::Tight);
        assert_eq!(classify_regime(&book(100.02, 100.00, 1.0, 1.0)), Regime::Wide);
        assert_eq!(classify_regime(&book(101.00, 100.00, 1.0, 1.0)), Regime::Wide);
    }

    #[test]
    fn test_tight_book_thin_asks_crosses() {
        // ask - bid = 0.02 is two ticks; use a one-tick book to stay tight
        let tight = book(100.01, 100.00, 1.0, 10.0);
        let decision = PriceDecisionEngine::default().decide(true, 100.01, &tight).unwrap();
        assert_eq!(decision.regime, Regime::Tight);
        assert_eq!(decision.role, Role::Taker);
        assert_eq!(decision.price, 100.01);
    }

    #[test]
    fn test_two_tick_spread_thin_asks_crosses_to_ask() {
        let decision = PriceDecisionEngine::default()
            .decide(true, 100.01, &book(100.02, 100.00, 1.0, 10.0))
            .unwrap();
        assert_eq!(decision.price, 100.02);
        assert_eq!(decision.role, Role::Taker);
    }

    #[test]
    fn test_wide_book_without_ask_pressure_crosses() {
        let decision = PriceDecisionEngine::default()
            .decide(true, 100.5, &book(101.00, 100.00, 5.0, 100.0))
            .unwrap();
        assert_eq!(decision.regime, Regime::Wide);
        assert_eq!(decision.rule, "buy.wide.cross");
        assert_eq!(decision.price, 101.00);
    }

    #[test]
    fn test_buy_tight_rows_ignore_k_for_price() {
        let walled = book(100.01, 100.00, 40.0, 10.0);
        let engine = PriceDecisionEngine::default();
        let above = engine.decide(true, 100.05, &walled).unwrap();
        let below = engine.decide(true, 99.90, &walled).unwrap();

        assert_eq!(above.price, 100.00);
        assert_eq!(below.price, 100.00);
        assert_eq!(above.rule, "buy.tight.k_at_or_above_ask.ask_wall");
        assert_eq!(below.rule, "buy.tight.k_below_ask.ask_wall");
    }

    #[test]
    fn test_buy_wide_rows() {
        let engine = PriceDecisionEngine::default();

        let wall = engine.decide(true, 0.0, &book(101.00, 100.00, 31.0, 10.0)).unwrap();
        assert_eq!(wall.price, 100.01);
        assert_eq!(wall.role, Role::Maker);

        let heavier = engine.decide(true, 0.0, &book(101.00, 100.00, 20.0, 10.0)).unwrap();
        assert_eq!(heavier.price, 100.99);
        assert_eq!(heavier.role, Role::Maker);
    }

    #[test]
    fn test_buy_wide_two_tick_spread_stays_inside() {
        let engine = PriceDecisionEngine::default();
        let d = engine.decide(true, 0.0, &book(100.02, 100.00, 50.0, 1.0)).unwrap();
        assert_eq!(d.price, 100.01);
        let d = engine.decide(true, 0.0, &book(100.02, 100.00, 2.0, 1.0)).unwrap();
        assert_eq!(d.price, 100.01);
    }

    #[test]
    fn test_sell_tight_rows() {
        let engine = PriceDecisionEngine::default();
        let walled = book(100.01, 100.00, 1.0, 10.0);

        let maker = engine.decide(false, 100.00, &walled).unwrap();
        assert_eq!(maker.price, 100.01);
        assert_eq!(maker.role, Role::Maker);

        let below = engine.decide(false, 99.99, &walled).unwrap();
        assert_eq!(below.price, 100.00);
        assert_eq!(below.rule, "sell.tight.k_below_bid.hit");

        let thin = engine.decide(false, 100.00, &book(100.01, 100.00, 5.0, 10.0)).unwrap();
        assert_eq!(thin.price, 100.00);
        assert_eq!(thin.role, Role::Taker);
    }

    #[test]
    fn test_sell_wide_rows() {
        let engine = PriceDecisionEngine::default();

        let wall = engine.decide(false, 0.0, &book(101.00, 100.00, 10.0, 31.0)).unwrap();
        assert_eq!(wall.price, 100.99);

        let heavier = engine.decide(false, 0.0, &book(101.00, 100.00, 10.0, 20.0)).unwrap();
        assert_eq!(heavier.price, 100.01);

        let hit = engine.decide(false, 0.0, &book(101.00, 100.00, 10.0, 10.0)).unwrap();
        assert_eq!(hit.price, 100.00);
        assert_eq!(hit.role, Role::Taker);
    }

    #[test]
    fn test_rows_individually() {
        let inputs = PriceInputs::new(true, 100.02, book(100.01, 100.00, 31.0, 10.0));
        assert!(row("buy.tight.k_at_or_above_ask.ask_wall").applies(&inputs));
        assert!(!row("buy.wide.ask_wall").applies(&inputs));

        let inputs = PriceInputs::new(false, 99.0, book(100.01, 100.00, 1.0, 100.0));
        assert!(!row("sell.tight.k_at_or_above_bid.bid_wall").applies(&inputs));
        assert!(row("sell.tight.k_below_bid.hit").applies(&inputs));

        let inputs = PriceInputs::new(true, 0.0, book(101.0, 100.0, 3.0, 1.0));
        // 3 is not strictly greater than 3 * 1
        assert!(!row("buy.wide.ask_wall").applies(&inputs));
        assert!(row("buy.wide.ask_heavier").applies(&inputs));
    }

    #[test]
    fn test_every_input_matches_some_row() {
        for is_buy in [true, false] {
            for (ask, bid) in [(100.01, 100.0), (100.5, 100.0)] {
                for (aq, bq) in [(1.0, 10.0), (10.0, 1.0), (5.0, 5.0)] {
                    for k in [99.0, 100.0, 100.01, 101.0] {
                        let inputs = PriceInputs::new(is_buy, k, book(ask, bid, aq, bq));
                        assert!(DECISION_TABLE.iter().any(|r| r.applies(&inputs)));
                    }
                }
            }
        }
    }

    #[test]
    fn test_decision_is_pure() {
        let engine = PriceDecisionEngine::default();
        let b = book(100.37, 100.11, 7.0, 3.0);
        let first = engine.decide(true, 100.2, &b).unwrap();
        let second = engine.decide(true, 100.2, &b).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_prices_are_tick_aligned() {
        let engine = PriceDecisionEngine::default();
        let mut b = book(2513.7, 2512.3, 50.0, 1.0);
        b.tick_size = 0.1;
        let d = engine.decide(true, 0.0, &b).unwrap();
        let steps = d.price / 0.1;
        assert!((steps - steps.round()).abs() < 1e-6);
        assert_eq!(d.price, 2512.4);
    }

    #[test]
    fn test_crossed_book_rejected() {
        let err = PriceDecisionEngine::default()
            .decide(true, 0.0, &book(99.0, 100.0, 1.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, TradingError::InvalidBook { .. }));
    }
}
