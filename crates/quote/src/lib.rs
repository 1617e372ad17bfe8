//! Deterministic quote engine
//!
//! The AI classifies the job; this engine calculates prices using
//! owner-defined rules. The model never sets prices directly.
//!
//! Every monetary value is rounded to 2 decimals at the line level, and
//! subtotal/GST/total are derived from the already-rounded line totals so
//! the breakdown stays internally consistent and auditable.

pub mod parts;

pub use parts::{PartPrice, lookup_part, parts_cost_for_job, search_parts, sku_for_job};

use leadline_core::{BusinessProfile, JobType, LineCategory, QuoteBreakdown, QuoteLine};

/// Australian GST rate.
const GST_RATE: f64 = 0.10;

/// Inputs to one quote computation.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteParams {
    pub callout_fee: f64,
    pub hourly_rate: f64,
    pub min_labour_hours: f64,
    pub estimated_hours: f64,
    /// Base parts cost before markup; zero when no part was identified.
    pub parts_cost: f64,
    pub markup_pct: f64,
    pub distance_km: f64,
    pub travel_rate_per_km: f64,
    pub include_gst: bool,
}

impl QuoteParams {
    /// Build params from a business profile plus the job-specific facts.
    pub fn from_profile(
        profile: &BusinessProfile,
        estimated_hours: f64,
        parts_cost: f64,
        distance_km: f64,
    ) -> Self {
        Self {
            callout_fee: profile.callout_fee,
            hourly_rate: profile.hourly_rate,
            min_labour_hours: profile.min_labour_hours,
            estimated_hours,
            parts_cost,
            markup_pct: profile.markup_pct,
            distance_km,
            travel_rate_per_km: profile.travel_rate_per_km,
            include_gst: true,
        }
    }
}

/// Round to 2 decimal places, ties away from zero.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Build a deterministic, explainable quote breakdown.
pub fn calculate_quote(params: &QuoteParams) -> QuoteBreakdown {
    let labour_hours = params.min_labour_hours.max(params.estimated_hours);
    let mut items: Vec<QuoteLine> = Vec::with_capacity(5);

    // 1. Callout fee
    items.push(QuoteLine {
        category: LineCategory::Callout,
        label: "Call-out Fee".to_string(),
        quantity: 1.0,
        unit_price: round2(params.callout_fee),
        total: round2(params.callout_fee),
        notes: None,
    });

    // 2. Labour
    let labour_total = round2(labour_hours * params.hourly_rate);
    items.push(QuoteLine {
        category: LineCategory::Labour,
        label: format!(
            "Labour ({labour_hours:.1} hrs @ ${:.2}/hr)",
            params.hourly_rate
        ),
        quantity: labour_hours,
        unit_price: params.hourly_rate,
        total: labour_total,
        notes: None,
    });

    // 3. Parts (with markup)
    if params.parts_cost > 0.0 {
        let parts_with_markup = round2(params.parts_cost * (1.0 + params.markup_pct / 100.0));
        items.push(QuoteLine {
            category: LineCategory::Parts,
            label: format!("Parts (incl. {:.0}% markup)", params.markup_pct),
            quantity: 1.0,
            unit_price: parts_with_markup,
            total: parts_with_markup,
            notes: Some(format!("Base parts cost: ${:.2}", params.parts_cost)),
        });
    }

    // 4. Travel surcharge
    if params.distance_km > 0.0 && params.travel_rate_per_km > 0.0 {
        let travel_total = round2(params.distance_km * params.travel_rate_per_km);
        items.push(QuoteLine {
            category: LineCategory::Travel,
            label: format!(
                "Travel ({:.1} km @ ${:.2}/km)",
                params.distance_km, params.travel_rate_per_km
            ),
            quantity: params.distance_km,
            unit_price: params.travel_rate_per_km,
            total: travel_total,
            notes: None,
        });
    }

    // Subtotal from the rounded line totals.
    let subtotal = round2(items.iter().map(|i| i.total).sum());

    // 5. GST
    let mut gst = 0.0;
    if params.include_gst {
        gst = round2(subtotal * GST_RATE);
        items.push(QuoteLine {
            category: LineCategory::Gst,
            label: "GST (10%)".to_string(),
            quantity: 1.0,
            unit_price: gst,
            total: gst,
            notes: None,
        });
    }

    let total = round2(subtotal + gst);

    QuoteBreakdown {
        line_items: items,
        subtotal,
        gst,
        total,
        currency: "AUD".to_string(),
    }
}

/// Estimated labour hours for common jobs. Job types without a specific
/// estimate fall back to 1.5 hours.
pub fn estimate_labour_hours(job_type: JobType) -> f64 {
    match job_type {
        JobType::TapRepair => 1.0,
        JobType::TapReplacement => 1.5,
        JobType::ToiletRepair => 1.5,
        JobType::ToiletReplacement => 2.5,
        JobType::BlockedDrain => 1.5,
        JobType::HotWaterRepair => 2.0,
        JobType::HotWaterReplacement => 4.0,
        JobType::LeakRepair => 1.5,
        JobType::PipeBurst => 2.0,
        JobType::GasFitting => 2.5,
        JobType::RoofPlumbing | JobType::BathroomReno | JobType::GeneralPlumbing => 1.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> QuoteParams {
        QuoteParams {
            callout_fee: 80.0,
            hourly_rate: 95.0,
            min_labour_hours: 1.0,
            estimated_hours: 2.0,
            parts_cost: 0.0,
            markup_pct: 15.0,
            distance_km: 8.0,
            travel_rate_per_km: 1.50,
            include_gst: true,
        }
    }

    #[test]
    fn quote_is_deterministic() {
        let params = base_params();
        let a = calculate_quote(&params);
        let b = calculate_quote(&params);
        assert_eq!(a, b);
    }

    #[test]
    fn breakdown_is_internally_consistent() {
        let quote = calculate_quote(&base_params());
        // 80 callout + 190 labour + 12 travel = 282, GST 28.20, total 310.20
        assert_eq!(quote.subtotal, 282.0);
        assert_eq!(quote.gst, 28.20);
        assert_eq!(quote.total, 310.20);
        assert!((quote.subtotal + quote.gst - quote.total).abs() < 0.005);

        let line_sum: f64 = quote.line_items.iter().map(|i| i.total).sum();
        assert!((line_sum - quote.total).abs() < 0.005);
    }

    #[test]
    fn minimum_labour_hours_apply() {
        let params = QuoteParams {
            estimated_hours: 0.25,
            min_labour_hours: 1.0,
            ..base_params()
        };
        let quote = calculate_quote(&params);
        let labour = quote
            .line_items
            .iter()
            .find(|i| i.category == LineCategory::Labour)
            .unwrap();
        assert_eq!(labour.quantity, 1.0);
        assert_eq!(labour.total, 95.0);
    }

    #[test]
    fn parts_line_carries_markup_and_base_cost_note() {
        let params = QuoteParams {
            parts_cost: 100.0,
            ..base_params()
        };
        let quote = calculate_quote(&params);
        let parts = quote
            .line_items
            .iter()
            .find(|i| i.category == LineCategory::Parts)
            .unwrap();
        assert_eq!(parts.total, 115.0);
        assert_eq!(parts.notes.as_deref(), Some("Base parts cost: $100.00"));
    }

    #[test]
    fn zero_parts_and_zero_distance_omit_those_lines() {
        let params = QuoteParams {
            parts_cost: 0.0,
            distance_km: 0.0,
            ..base_params()
        };
        let quote = calculate_quote(&params);
        let categories: Vec<_> = quote.line_items.iter().map(|i| i.category).collect();
        assert_eq!(
            categories,
            vec![LineCategory::Callout, LineCategory::Labour, LineCategory::Gst]
        );
    }

    #[test]
    fn gst_derives_from_rounded_lines() {
        // Rates chosen so unrounded and rounded sums diverge.
        let params = QuoteParams {
            callout_fee: 80.555,
            hourly_rate: 95.333,
            min_labour_hours: 1.0,
            estimated_hours: 1.0,
            parts_cost: 0.0,
            markup_pct: 15.0,
            distance_km: 0.0,
            travel_rate_per_km: 1.50,
            include_gst: true,
        };
        let quote = calculate_quote(&params);
        let rounded_lines: f64 = quote
            .line_items
            .iter()
            .filter(|i| i.category != LineCategory::Gst)
            .map(|i| i.total)
            .sum();
        assert_eq!(quote.subtotal, (rounded_lines * 100.0).round() / 100.0);
        assert_eq!(quote.gst, (quote.subtotal * 10.0).round() / 100.0);
    }

    #[test]
    fn labour_estimates_table() {
        assert_eq!(estimate_labour_hours(JobType::TapRepair), 1.0);
        assert_eq!(estimate_labour_hours(JobType::HotWaterReplacement), 4.0);
        assert_eq!(estimate_labour_hours(JobType::GeneralPlumbing), 1.5);
    }
}
