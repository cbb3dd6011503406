//! Prompt building for celebration videos.
//!
//! The prompt comes from the first available source: an explicit custom prompt, the
//! donor's own message, or a canned template chosen by donation amount. A configured
//! system prompt is prepended to whichever base was chosen.

use serde::{Deserialize, Serialize};

/// A canned prompt used for donations of at least `min_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTier {
    pub min_amount: f64,
    pub prompt: String,
}

impl PromptTier {
    pub fn new(min_amount: f64, prompt: impl Into<String>) -> Self {
        Self {
            min_amount,
            prompt: prompt.into(),
        }
    }
}

/// Built-in tiers, lowest first.
pub fn default_tiers() -> Vec<PromptTier> {
    vec![
        PromptTier::new(
            1000.0,
            "A spectacular celebration with golden confetti falling from the sky, sparkling lights, and festive decorations. Camera slowly zooms in on celebration scene with warm, joyful lighting.",
        ),
        PromptTier::new(
            2000.0,
            "An epic fireworks display lighting up the night sky with brilliant colors, golden sparks cascading down like a waterfall of light, celebration atmosphere with magical sparkles.",
        ),
        PromptTier::new(
            5000.0,
            "A grand royal celebration in a magnificent palace hall with golden chandeliers, flowing silk banners, rose petals falling gracefully, and majestic orchestral atmosphere.",
        ),
        PromptTier::new(
            10000.0,
            "An otherworldly cosmic celebration with stars exploding into rainbow colors, nebula clouds dancing through space, celestial music visualized as light waves across the universe.",
        ),
        PromptTier::new(
            50000.0,
            "A legendary dragon made of pure golden light soaring through crystal clouds, breathing rainbow fire that transforms into celebration fireworks, epic fantasy atmosphere with orchestral crescendo.",
        ),
    ]
}

/// Select the template of the highest tier not above `amount` and append the
/// amount-specific suffix. Amounts below every tier get a generic prompt.
pub fn tiered_prompt(tiers: &[PromptTier], amount: f64, currency: &str) -> String {
    let best = tiers
        .iter()
        .filter(|tier| amount >= tier.min_amount)
        .max_by(|a, b| a.min_amount.total_cmp(&b.min_amount));

    match best {
        Some(tier) => format!("{}{}", tier.prompt, celebration_suffix(amount, currency)),
        None => format!(
            "A beautiful celebration with sparkling lights and festive atmosphere, honoring a generous donation of {} {}.",
            format_grouped(amount),
            currency
        ),
    }
}

fn celebration_suffix(amount: f64, currency: &str) -> String {
    let shown = format_grouped(amount);
    if amount >= 50000.0 {
        format!(" This celebration honors an extraordinary donation of {shown} {currency} - truly legendary generosity!")
    } else if amount >= 10000.0 {
        format!(" This magnificent celebration celebrates {shown} {currency} of incredible generosity!")
    } else if amount >= 5000.0 {
        format!(" This grand celebration honors {shown} {currency} of amazing support!")
    } else if amount >= 2000.0 {
        format!(" This epic celebration is for {shown} {currency} of wonderful generosity!")
    } else {
        format!(" This beautiful celebration thanks the donor for {shown} {currency}!")
    }
}

/// Round half to even and group thousands with commas (`12345.6` -> `12,346`).
pub fn format_grouped(amount: f64) -> String {
    let rounded = amount.round_ties_even();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Which source the base prompt was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSource {
    Custom,
    DonationMessage,
    AmountTemplate,
}

/// Assemble the final prompt.
///
/// `template` is only called when neither a custom prompt nor a donation message is
/// available.
pub fn build_prompt(
    custom: Option<&str>,
    message: &str,
    template: impl FnOnce() -> String,
    system_prompt: &str,
) -> (String, PromptSource) {
    let custom = custom.map(str::trim).filter(|p| !p.is_empty());
    let message = message.trim();

    let (base, source) = if let Some(custom) = custom {
        (custom.to_string(), PromptSource::Custom)
    } else if !message.is_empty() {
        (message.to_string(), PromptSource::DonationMessage)
    } else {
        (template(), PromptSource::AmountTemplate)
    };

    let system_prompt = system_prompt.trim();
    if system_prompt.is_empty() {
        (base, source)
    } else {
        (format!("{system_prompt}\n\n{base}"), source)
    }
}
