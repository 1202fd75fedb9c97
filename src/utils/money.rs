//! 金额工具：最小单位换算与美元展示格式

use rust_decimal::Decimal;

/// rust_decimal 尾数为 96 位，最多 28 位有效数字、28 位小数
const MAX_DIGITS: usize = 28;
const MAX_SCALE: u32 = 28;

/// 最小单位整数 → 显示单位小数（wei → ETH, satoshi → BTC ...）
pub fn units_to_decimal(raw: u128, decimals: u32) -> Option<Decimal> {
    parse_units(&raw.to_string(), decimals)
}

/// 解析十进制整数字符串形式的最小单位余额
///
/// 超出精度的低位数字直接截去；只有整数部分本身超过 28 位时返回 None。
pub fn parse_units(raw: &str, decimals: u32) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits = raw.trim_start_matches('0');
    let dropped = digits
        .len()
        .saturating_sub(MAX_DIGITS)
        .max(decimals.saturating_sub(MAX_SCALE) as usize);
    if dropped >= digits.len() {
        return Some(Decimal::ZERO);
    }

    let scale = decimals.checked_sub(u32::try_from(dropped).ok()?)?;
    let mantissa: i128 = digits[..digits.len() - dropped].parse().ok()?;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .ok()
        .map(|d| d.normalize())
}

/// 原生币余额的字符串形式，零值统一为 "0.00"
pub fn format_native(amount: Decimal) -> String {
    if amount.is_zero() {
        "0.00".to_string()
    } else {
        amount.normalize().to_string()
    }
}

/// 美元展示格式：$1,234.56；负数、NaN、无穷统一显示为 $0.00
pub fn format_usd(value: f64) -> String {
    if !value.is_finite() || value <= 0.0 {
        return "$0.00".to_string();
    }

    let cents = (value * 100.0).round() as u128;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${}.{:02}", grouped, frac)
}
