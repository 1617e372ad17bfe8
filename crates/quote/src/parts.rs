//! Static parts catalogue
//!
//! Indicative trade prices for the parts most jobs need, keyed by SKU
//! class. The quote engine only ever reads from here; the catalogue is a
//! stand-in for a supplier price feed.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use leadline_core::JobType;

/// One catalogue entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartPrice {
    pub sku_class: &'static str,
    pub name: &'static str,
    /// Trade price in AUD, before markup.
    pub price: f64,
    /// Where the price came from, for the owner's reference.
    pub source: &'static str,
}

static CATALOGUE: &[PartPrice] = &[
    PartPrice {
        sku_class: "tap_cartridge",
        name: "Ceramic tap cartridge",
        price: 25.0,
        source: "supplier list 2025",
    },
    PartPrice {
        sku_class: "tap_mixer",
        name: "Basin mixer tap",
        price: 89.0,
        source: "supplier list 2025",
    },
    PartPrice {
        sku_class: "toilet_inlet_valve",
        name: "Cistern inlet valve",
        price: 35.0,
        source: "supplier list 2025",
    },
    PartPrice {
        sku_class: "toilet_suite",
        name: "Back-to-wall toilet suite",
        price: 320.0,
        source: "supplier list 2025",
    },
    PartPrice {
        sku_class: "hot_water_element",
        name: "Hot water element and thermostat",
        price: 120.0,
        source: "supplier list 2025",
    },
    PartPrice {
        sku_class: "hot_water_system_electric",
        name: "250L electric hot water system",
        price: 1_100.0,
        source: "supplier list 2025",
    },
    PartPrice {
        sku_class: "pipe_fittings",
        name: "Copper pipe and fittings",
        price: 45.0,
        source: "supplier list 2025",
    },
    PartPrice {
        sku_class: "gas_fittings",
        name: "Gas valve and fittings",
        price: 150.0,
        source: "supplier list 2025",
    },
];

static BY_SKU: Lazy<HashMap<&'static str, &'static PartPrice>> =
    Lazy::new(|| CATALOGUE.iter().map(|p| (p.sku_class, p)).collect());

/// Look up a catalogue entry by SKU class.
pub fn lookup_part(sku_class: &str) -> Option<&'static PartPrice> {
    BY_SKU.get(sku_class).copied()
}

/// The default SKU class for a job type, when the job usually needs a
/// part. Repairs that are typically labour-only return `None`.
pub fn sku_for_job(job_type: JobType) -> Option<&'static str> {
    match job_type {
        JobType::TapRepair => Some("tap_cartridge"),
        JobType::TapReplacement => Some("tap_mixer"),
        JobType::ToiletRepair => Some("toilet_inlet_valve"),
        JobType::ToiletReplacement => Some("toilet_suite"),
        JobType::HotWaterRepair => Some("hot_water_element"),
        JobType::HotWaterReplacement => Some("hot_water_system_electric"),
        JobType::LeakRepair | JobType::PipeBurst => Some("pipe_fittings"),
        JobType::GasFitting => Some("gas_fittings"),
        JobType::BlockedDrain
        | JobType::RoofPlumbing
        | JobType::BathroomReno
        | JobType::GeneralPlumbing => None,
    }
}

/// Base parts cost for a job type; zero when no part applies.
pub fn parts_cost_for_job(job_type: JobType) -> f64 {
    sku_for_job(job_type)
        .and_then(lookup_part)
        .map(|p| p.price)
        .unwrap_or(0.0)
}

/// Case-insensitive substring search over SKU class and display name.
pub fn search_parts(query: &str) -> Vec<&'static PartPrice> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    CATALOGUE
        .iter()
        .filter(|p| p.sku_class.contains(&needle) || p.name.to_lowercase().contains(&needle))
        .collect()
}
