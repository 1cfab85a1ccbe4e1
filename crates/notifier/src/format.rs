use common::{Direction, SignalVerdict};

pub fn direction_icon(direction: Direction) -> &'static str {
    match direction {
        Direction::LongEntry => "🟢",
        Direction::ShortEntry => "🔴",
        Direction::CloseLong => "🔵",
        Direction::CloseShort => "🟠",
        Direction::None => "💡",
    }
}

/// Chat message for a verdict, in Telegram HTML.
pub fn signal_html(verdict: &SignalVerdict) -> String {
    format!(
        "{icon} <b>{direction}</b>\n💰 {symbol} | ⏰ {timeframe}\nPrice: <code>{price}</code>\n🔥 {reason}",
        icon = direction_icon(verdict.direction),
        direction = verdict.direction,
        symbol = escape_html(&verdict.target.symbol),
        timeframe = verdict.target.timeframe,
        price = verdict.price,
        reason = escape_html(&verdict.reason),
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
