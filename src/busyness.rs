//! Current-load extraction from weekly popularity histograms.

use crate::clock::Moment;
use crate::record::{CategoryData, DayHistogram};

/// Load percentage for the exact `(iso_weekday, hour)` cell, if present.
///
/// No interpolation across hours or days.
pub fn load_at(histogram: &[DayHistogram], iso_weekday: u32, hour: u32) -> Option<u32> {
    histogram
        .iter()
        .filter(|day| day.day == iso_weekday)
        .flat_map(|day| day.popular_times.iter())
        .find(|cell| cell.hour == hour)
        .map(|cell| cell.percentage)
}

/// Load percentage for the weekday and hour of `moment`.
pub fn current_load(histogram: Option<&[DayHistogram]>, moment: &Moment) -> Option<u32> {
    load_at(histogram?, moment.iso_weekday(), moment.hour())
}

/// A single point destined for an external time-series store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadSample {
    pub category: String,
    pub name: String,
    pub busyness: u32,
}

/// Select the samples worth recording from a reconciled result.
///
/// Known-closed records contribute 0, open records with a load contribute it,
/// and everything else (open without data, unknown hours and outside the
/// default window) is skipped rather than recorded as a guess.
pub fn history_samples(data: &CategoryData) -> Vec<LoadSample> {
    data.iter()
        .flat_map(|(category, records)| {
            records.iter().filter_map(move |record| {
                let busyness = if record.hours_known && !record.is_open {
                    0
                } else if record.is_open {
                    record.busyness?
                } else {
                    return None;
                };
                Some(LoadSample {
                    category: category.clone(),
                    name: record.name.clone(),
                    busyness,
                })
            })
        })
        .collect()
}
