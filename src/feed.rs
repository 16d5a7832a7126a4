//! Live feed filtering and the heat layer handed to the renderer.

use std::collections::VecDeque;

use crate::{FilterCriteria, GeofenceValidator, HeatPoint, IncomingSample, WeightNormalizer};

// ---

/// Gate applied identically to pulled and pushed samples.
#[derive(Debug, Clone, Copy)]
pub struct LiveFeedFilter<'a> {
    geofence: &'a GeofenceValidator,
    normalizer: &'a WeightNormalizer,
}

impl<'a> LiveFeedFilter<'a> {
    pub fn new(geofence: &'a GeofenceValidator, normalizer: &'a WeightNormalizer) -> Self {
        Self {
            geofence,
            normalizer,
        }
    }

    /// Both coordinates, inside campus, and every set criteria field matches.
    ///
    /// Server-asserted points carry no accuracy, so only containment applies.
    pub fn accepts(&self, sample: &IncomingSample, criteria: &FilterCriteria) -> bool {
        // ---
        let Some((lat, lng)) = sample.coordinates() else {
            return false;
        };
        self.geofence.contains(lat, lng) && criteria.matches(sample)
    }

    /// Weighted point for an accepted sample.
    pub fn to_heat_point(
        &self,
        sample: &IncomingSample,
        criteria: &FilterCriteria,
    ) -> Option<HeatPoint> {
        // ---
        if !self.accepts(sample, criteria) {
            return None;
        }
        let (lat, lng) = sample.coordinates()?;
        let weight = self
            .normalizer
            .to_weight(criteria.metric, sample.metric_value(criteria.metric));
        Some(HeatPoint { lat, lng, weight })
    }
}

/// Current heat points, oldest first, bounded.
///
/// Updates for the same coordinate may arrive out of order; the layer keeps
/// them all and lets the renderer blend.
#[derive(Debug, Clone)]
pub struct HeatLayer {
    points: VecDeque<HeatPoint>,
    max_points: usize,
}

impl HeatLayer {
    pub fn new(max_points: usize) -> Self {
        Self {
            points: VecDeque::new(),
            max_points: max_points.max(1),
        }
    }

    pub fn replace(&mut self, points: impl IntoIterator<Item = HeatPoint>) {
        self.points.clear();
        for p in points {
            self.push(p);
        }
    }

    pub fn push(&mut self, point: HeatPoint) {
        if self.points.len() == self.max_points {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn points(&self) -> Vec<HeatPoint> {
        self.points.iter().copied().collect()
    }
}
