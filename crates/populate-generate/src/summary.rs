use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use populate_core::{ApplierRecord, Coordinates, QUESTION_THRESHOLD};

/// Distribution of children per parent for one foreign-key edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FanOutStats {
    pub parents: u64,
    pub children: u64,
    pub childless: u64,
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl FanOutStats {
    pub fn record(&mut self, children: u64) {
        self.parents += 1;
        self.children += children;
        if children == 0 {
            self.childless += 1;
        }
        self.min = Some(self.min.map_or(children, |min| min.min(children)));
        self.max = Some(self.max.map_or(children, |max| max.max(children)));
    }

    pub fn mean(&self) -> f64 {
        if self.parents == 0 {
            0.0
        } else {
            self.children as f64 / self.parents as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    fn around(point: &Coordinates) -> Self {
        Self {
            min_latitude: point.latitude,
            max_latitude: point.latitude,
            min_longitude: point.longitude,
            max_longitude: point.longitude,
        }
    }

    fn include(&mut self, point: &Coordinates) {
        self.min_latitude = self.min_latitude.min(point.latitude);
        self.max_latitude = self.max_latitude.max(point.latitude);
        self.min_longitude = self.min_longitude.min(point.longitude);
        self.max_longitude = self.max_longitude.max(point.longitude);
    }
}

/// Shape of the generated dataset, as seen by the serving application's
/// list and proximity queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub status_counts: BTreeMap<String, u64>,
    pub premium_appliers: u64,
    pub appliers_per_user: FanOutStats,
    pub questions_per_applier: FanOutStats,
    pub question_threshold: u64,
    pub appliers_above_question_threshold: u64,
    pub skipped_questions: u64,
    pub bounding_box: Option<BoundingBox>,
}

impl Default for DatasetSummary {
    fn default() -> Self {
        Self {
            status_counts: BTreeMap::new(),
            premium_appliers: 0,
            appliers_per_user: FanOutStats::default(),
            questions_per_applier: FanOutStats::default(),
            question_threshold: QUESTION_THRESHOLD,
            appliers_above_question_threshold: 0,
            skipped_questions: 0,
            bounding_box: None,
        }
    }
}

impl DatasetSummary {
    pub fn record_applier(&mut self, applier: &ApplierRecord) {
        *self
            .status_counts
            .entry(applier.qualified.as_str().to_string())
            .or_insert(0) += 1;
        if applier.source.is_premium {
            self.premium_appliers += 1;
        }
        match self.bounding_box.as_mut() {
            Some(bbox) => bbox.include(&applier.coordinates),
            None => self.bounding_box = Some(BoundingBox::around(&applier.coordinates)),
        }
    }

    pub fn record_applier_fan_out(&mut self, appliers: u64) {
        self.appliers_per_user.record(appliers);
    }

    pub fn record_question_fan_out(&mut self, questions: u64) {
        self.questions_per_applier.record(questions);
        if questions > self.question_threshold {
            self.appliers_above_question_threshold += 1;
        }
    }

    pub fn record_skipped_question(&mut self) {
        self.skipped_questions += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_out_stats_track_extremes() {
        let mut stats = FanOutStats::default();
        for children in [3, 0, 7, 2] {
            stats.record(children);
        }
        assert_eq!(stats.parents, 4);
        assert_eq!(stats.children, 12);
        assert_eq!(stats.childless, 1);
        assert_eq!(stats.min, Some(0));
        assert_eq!(stats.max, Some(7));
        assert_eq!(stats.mean(), 3.0);
    }

    #[test]
    fn counts_appliers_strictly_above_threshold() {
        let mut summary = DatasetSummary::default();
        summary.record_question_fan_out(16);
        summary.record_question_fan_out(17);
        summary.record_question_fan_out(40);
        assert_eq!(summary.appliers_above_question_threshold, 2);
    }
}
