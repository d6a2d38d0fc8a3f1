//! Telegram-style HTML renderings of signals, position events and cycle summaries.

use crate::monitor::{CloseReason, MonitorEvent};
use crate::pipeline::{CycleReport, PairOutcome};
use crate::reaction::ReactionOutcome;
use fxsignal_core::domain::{CurrencyPair, TradeDirection};
use fxsignal_core::risk::TrailingStopUpdate;
use fxsignal_core::EnrichedSignal;
use std::fmt::{self, Write};

/// Escape the three characters Telegram's HTML mode treats as markup.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Five decimals, three for JPY-quoted pairs.
pub fn price(pair: &CurrencyPair, value: f64) -> String {
    let decimals = if pair.is_jpy_quoted() { 3 } else { 5 };
    format!("{value:.decimals$}")
}

fn side(direction: TradeDirection) -> &'static str {
    match direction {
        TradeDirection::Long => "BUY",
        TradeDirection::Short => "SELL",
    }
}

pub fn signal_ready(enriched: &EnrichedSignal) -> String {
    let s = &enriched.signal;
    let l = &enriched.levels;
    let p = &enriched.position;
    let pair = &s.pair;
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "<b>{} {}</b> ({})", side(s.direction), pair, s.strength);
    let _ = writeln!(out, "Entry: <code>{}</code>", price(pair, l.entry_price));
    let _ = writeln!(
        out,
        "Stop: <code>{}</code> ({:.1} pips)",
        price(pair, l.stop_loss),
        l.stop_distance_pips
    );
    let tranches = l.tranche_lots(p.position_size_lots);
    for (i, (tp, split)) in l.take_profits().iter().zip(l.position_splits).enumerate() {
        let _ = writeln!(
            out,
            "TP{}: <code>{}</code> ({:.0}R, close {:.0}% = {:.2} lots)",
            i + 1,
            price(pair, *tp),
            l.tp_multiples[i],
            split,
            tranches[i]
        );
    }
    let _ = writeln!(
        out,
        "Size: {:.2} lots, risk {:.2}",
        p.position_size_lots, p.risk_amount
    );
    let _ = writeln!(
        out,
        "Trend: H4 {} ({}), H1 {} ({})",
        s.trend_h4.direction, s.trend_h4.strength, s.trend_h1.direction, s.trend_h1.strength
    );
    if let Some(zone) = &s.entry_zone {
        let _ = writeln!(out, "Zone: {} at <code>{}</code>", zone.zone_type, price(pair, zone.price_level));
    }
    let _ = writeln!(out, "News: {}", escape(&s.fundamental.rationale));
    let _ = write!(out, "Valid until {}", s.expires_at.format("%Y-%m-%d %H:%M UTC"));
    out
}

/// Result of the market-reaction check for one signal.
pub fn reaction(enriched: &EnrichedSignal, outcome: &ReactionOutcome) -> String {
    let s = &enriched.signal;
    let pair = &s.pair;
    match outcome {
        ReactionOutcome::Confirmed { price: at } => format!(
            "<b>Entry confirmed</b> {} {}\nPrice <code>{}</code>, entry <code>{}</code>, stop <code>{}</code>",
            side(s.direction),
            pair,
            price(pair, *at),
            price(pair, enriched.levels.entry_price),
            price(pair, enriched.levels.stop_loss)
        ),
        ReactionOutcome::Cancelled { price: at, adverse_pct } => format!(
            "<b>Entry cancelled</b> {} {}\nPrice <code>{}</code> moved {:.2}% against entry <code>{}</code>",
            side(s.direction),
            pair,
            price(pair, *at),
            adverse_pct,
            price(pair, enriched.levels.entry_price)
        ),
        ReactionOutcome::Expired => format!(
            "<b>Signal expired</b> {} {}\nNot confirmed before {}",
            side(s.direction),
            pair,
            s.expires_at.format("%Y-%m-%d %H:%M UTC")
        ),
    }
}

pub fn stop_moved(update: &TrailingStopUpdate) -> String {
    let pair = &update.pair;
    format!(
        "<b>Stop moved</b> {} {}\n{} → <code>{}</code>\n{} at {:.1}R, {:.1} pips locked",
        side(update.direction),
        pair,
        price(pair, update.old_stop),
        price(pair, update.new_stop),
        escape(&update.reason),
        update.r_multiple,
        update.profit_locked_pips
    )
}

pub fn monitor_event(event: &MonitorEvent) -> String {
    match event {
        MonitorEvent::TakeProfitHit {
            pair,
            direction,
            level,
            target,
            price: at,
            ..
        } => format!(
            "<b>TP{level} hit</b> {} {}\nTarget <code>{}</code>, price <code>{}</code>",
            side(*direction),
            pair,
            price(pair, *target),
            price(pair, *at)
        ),
        MonitorEvent::StopMoved(update) => stop_moved(update),
        MonitorEvent::StopHit {
            pair,
            direction,
            stop,
            price: at,
            r_multiple,
            ..
        } => format!(
            "<b>Stop hit</b> {} {}\nStop <code>{}</code>, price <code>{}</code> ({:+.1}R)",
            side(*direction),
            pair,
            price(pair, *stop),
            price(pair, *at),
            r_multiple
        ),
        MonitorEvent::Closed { pair, reason, .. } => {
            let why = match reason {
                CloseReason::StopLoss => "stopped out",
                CloseReason::FinalTarget => "final target reached",
            };
            format!("<b>Closed</b> {pair}: {why}")
        }
    }
}

pub fn cycle_summary(report: &CycleReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<b>Cycle {}</b>: {} signals, {} failures",
        report.finished_at.format("%Y-%m-%d %H:%M UTC"),
        report.signal_count(),
        report.failure_count()
    );
    for outcome in &report.outcomes {
        let _ = match outcome {
            PairOutcome::Signal(s) => writeln!(
                out,
                "{}: {} {}",
                s.signal.pair,
                side(s.signal.direction),
                s.signal.strength
            ),
            PairOutcome::NoSignal { pair, reason } => writeln!(out, "{pair}: {}", escape(&reason.to_string())),
            PairOutcome::Failed { pair, error, .. } => writeln!(out, "{pair}: error, {}", escape(error)),
        };
    }
    out.trim_end().to_string()
}

pub fn error_alert(context: &str, error: &dyn fmt::Display) -> String {
    format!("<b>Error</b> {}\n<code>{}</code>", escape(context), escape(&error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("a < b & c > d"), "a &lt; b &amp; c &gt; d");
    }

    #[test]
    fn jpy_prices_use_three_decimals() {
        let jpy: CurrencyPair = "USD/JPY".parse().unwrap();
        let usd: CurrencyPair = "GBP/USD".parse().unwrap();
        assert_eq!(price(&jpy, 150.1234), "150.123");
        assert_eq!(price(&usd, 1.27), "1.27000");
    }

    #[test]
    fn error_alert_is_escaped() {
        let msg = error_alert("scan <GBP/USD>", &"bad & worse");
        assert!(msg.contains("&lt;GBP/USD&gt;"));
        assert!(msg.contains("bad &amp; worse"));
    }
}
