use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::complaint::Complaint;
use crate::config::AppConfig;
use crate::geo::GeoPoint;
use crate::geocode::{AddressResolver, GeocodeError, PROVIDER_UNAVAILABLE_MESSAGE};
use crate::notify::NoticeKind;
use crate::pipeline::{derive_by, FilterSortSpec};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlottedComplaint {
    pub complaint: Complaint,
    pub position: GeoPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverlayProgress {
    pub processed: usize,
    pub total: usize,
    pub plotted: usize,
}

impl OverlayProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed * 100) / self.total).min(100) as u8
    }
}

pub type ProgressObserver = Arc<dyn Fn(OverlayProgress) + Send + Sync>;

/// Places complaints on the map by forward-geocoding their addresses.
pub struct MapOverlay {
    resolver: AddressResolver,
    region_suffix: String,
    min_score: u8,
}

impl MapOverlay {
    pub fn new(resolver: AddressResolver, config: &AppConfig) -> Self {
        Self::with_settings(
            resolver,
            config.geocoder_region_suffix.clone(),
            config.overlay_min_score,
        )
    }

    pub fn with_settings(
        resolver: AddressResolver,
        region_suffix: impl Into<String>,
        min_score: u8,
    ) -> Self {
        Self {
            resolver,
            region_suffix: region_suffix.into(),
            min_score,
        }
    }

    pub fn min_score(&self) -> u8 {
        self.min_score
    }

    /// Address as sent to the provider, with the region appended when missing.
    pub fn search_query(&self, address: &str) -> String {
        let address = address.trim();
        if self.region_suffix.is_empty() || address.contains(self.region_suffix.as_str()) {
            address.to_string()
        } else {
            format!("{address}, {}", self.region_suffix)
        }
    }

    pub async fn plot(
        &self,
        complaints: &[Complaint],
        observer: Option<ProgressObserver>,
    ) -> Result<Vec<PlottedComplaint>, GeocodeError> {
        let unique = dedupe(complaints);
        let total = unique.len();
        let mut plotted = Vec::with_capacity(total);

        for (processed, complaint) in unique.into_iter().enumerate() {
            if complaint.address.trim().is_empty() {
                debug!(id = ?complaint.id, "complaint has no address; skipping");
            } else {
                let query = self.search_query(&complaint.address);
                match self.resolver.locate(&query).await {
                    Ok(position) => plotted.push(PlottedComplaint {
                        complaint,
                        position,
                    }),
                    Err(err) if err.is_fatal() => {
                        warn!(?err, "map overlay aborted");
                        self.resolver
                            .notices()
                            .post(NoticeKind::Error, PROVIDER_UNAVAILABLE_MESSAGE);
                        return Err(err);
                    }
                    Err(err) => {
                        warn!(?err, query = %query, "could not place complaint on map");
                    }
                }
            }

            if let Some(callback) = &observer {
                callback(OverlayProgress {
                    processed: processed + 1,
                    total,
                    plotted: plotted.len(),
                });
            }
        }

        info!(total, plotted = plotted.len(), "map overlay ready");
        Ok(plotted)
    }

    /// Markers passing `spec`. Without an explicit floor the overlay's own
    /// minimum score applies; `Some(0)` shows every score.
    pub fn visible(
        &self,
        plotted: &[PlottedComplaint],
        spec: &FilterSortSpec,
    ) -> Vec<PlottedComplaint> {
        let spec = FilterSortSpec {
            min_score: spec.min_score.or(Some(self.min_score)),
            ..spec.clone()
        };
        derive_by(plotted, &spec, |marker| &marker.complaint)
    }
}

/// One record per `(address, text)` pair, keeping the most recently updated
/// one. Pairs stay in first-seen order.
pub fn dedupe(complaints: &[Complaint]) -> Vec<Complaint> {
    let mut slots: HashMap<(&str, &str), usize> = HashMap::new();
    let mut unique: Vec<Complaint> = Vec::new();

    for complaint in complaints {
        let key = (complaint.address.as_str(), complaint.complaint.as_str());
        match slots.get(&key) {
            Some(&idx) => {
                if complaint.updated_at > unique[idx].updated_at {
                    unique[idx] = complaint.clone();
                }
            }
            None => {
                slots.insert(key, unique.len());
                unique.push(complaint.clone());
            }
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::complaint::{parse_timestamp, Category, ComplaintId, ComplaintStatus};
    use crate::geocode::{GeocoderService, GeocodingProvider};
    use crate::notify::NoticeBoard;
    use crate::pipeline::StatusFilter;
    use crate::throttle::ThrottleGate;

    #[derive(Default)]
    struct Gazetteer {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GeocodingProvider for Gazetteer {
        async fn reverse(&self, _point: GeoPoint) -> Result<String, GeocodeError> {
            Err(GeocodeError::NoResult)
        }

        async fn search(&self, query: &str) -> Result<GeoPoint, GeocodeError> {
            self.queries.lock().push(query.to_string());
            if query.starts_with("Чуй") {
                Ok(GeoPoint::new(42.8746, 74.5698))
            } else if query.starts_with("Ош") {
                Ok(GeoPoint::new(40.5283, 72.7985))
            } else {
                Err(GeocodeError::NoResult)
            }
        }
    }

    fn complaint(id: i64, address: &str, text: &str, score: u8, updated: &str) -> Complaint {
        Complaint {
            id: Some(ComplaintId::Number(id)),
            complaint: text.into(),
            address: address.into(),
            category: Category::Transport,
            status: ComplaintStatus::New,
            seriousness_score: score,
            created_at: None,
            updated_at: parse_timestamp(updated),
        }
    }

    fn overlay_with(provider: Arc<Gazetteer>) -> MapOverlay {
        let resolver = AddressResolver::with_provider(
            GeocoderService::from_provider(provider),
            Arc::new(ThrottleGate::new(Duration::from_millis(1_100))),
            50,
            NoticeBoard::new(),
        );
        MapOverlay::with_settings(resolver, "Кыргызстан", 4)
    }

    #[test]
    fn dedupe_keeps_latest_update() {
        let list = vec![
            complaint(1, "Чуй 1", "Яма", 5, "2024-01-01"),
            complaint(2, "Ош", "Мусор", 6, "2024-01-01"),
            complaint(3, "Чуй 1", "Яма", 7, "2024-05-01"),
            complaint(4, "Чуй 1", "Яма", 2, "2024-02-01"),
        ];
        let unique = dedupe(&list);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, Some(ComplaintId::Number(3)));
        assert_eq!(unique[1].id, Some(ComplaintId::Number(2)));
    }

    #[test]
    fn appends_region_once() {
        let overlay = overlay_with(Arc::new(Gazetteer::default()));
        assert_eq!(overlay.search_query("Чуй 1"), "Чуй 1, Кыргызстан");
        assert_eq!(
            overlay.search_query("Бишкек, Кыргызстан"),
            "Бишкек, Кыргызстан"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn plots_locatable_complaints_and_reports_progress() {
        let provider = Arc::new(Gazetteer::default());
        let overlay = overlay_with(Arc::clone(&provider));
        let list = vec![
            complaint(1, "Чуй 1", "Яма", 5, "2024-01-01"),
            complaint(2, "Нигде", "Шум", 6, "2024-01-01"),
            complaint(3, "", "Без адреса", 6, "2024-01-01"),
            complaint(4, "Ош", "Мусор", 8, "2024-01-01"),
            complaint(5, "Чуй 1", "Яма", 9, "2024-03-01"),
        ];

        let seen = Arc::new(Mutex::new(Vec::<OverlayProgress>::new()));
        let sink = Arc::clone(&seen);
        let observer: ProgressObserver =
            Arc::new(move |progress: OverlayProgress| sink.lock().push(progress));

        let plotted = overlay.plot(&list, Some(observer)).await.unwrap();
        assert_eq!(plotted.len(), 2);
        assert_eq!(plotted[0].complaint.seriousness_score, 9);
        assert_eq!(plotted[1].position, GeoPoint::new(40.5283, 72.7985));

        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 4);
        assert_eq!(
            seen.last().copied(),
            Some(OverlayProgress {
                processed: 4,
                total: 4,
                plotted: 2
            })
        );
        assert_eq!(
            provider.queries.lock().clone(),
            vec![
                "Чуй 1, Кыргызстан".to_string(),
                "Нигде, Кыргызстан".to_string(),
                "Ош, Кыргызстан".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_provider_aborts_plotting() {
        let notices = NoticeBoard::new();
        let resolver = AddressResolver::with_provider(
            GeocoderService::unavailable("no api"),
            Arc::new(ThrottleGate::new(Duration::from_millis(1_100))),
            50,
            notices.clone(),
        );
        let overlay = MapOverlay::with_settings(resolver, "Кыргызстан", 4);
        let list = vec![complaint(1, "Чуй 1", "Яма", 5, "2024-01-01")];

        let err = overlay.plot(&list, None).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            notices.current().unwrap().message,
            PROVIDER_UNAVAILABLE_MESSAGE
        );
    }

    #[test]
    fn visible_applies_overlay_floor() {
        let overlay = overlay_with(Arc::new(Gazetteer::default()));
        let at = GeoPoint::new(42.0, 74.0);
        let plotted: Vec<PlottedComplaint> = [3u8, 4, 9]
            .iter()
            .enumerate()
            .map(|(idx, score)| PlottedComplaint {
                complaint: complaint(idx as i64, "Чуй 1", "Яма", *score, "2024-01-01"),
                position: at,
            })
            .collect();

        let default_view = overlay.visible(&plotted, &FilterSortSpec::default());
        assert_eq!(default_view.len(), 2);

        let everything = FilterSortSpec {
            min_score: Some(0),
            ..FilterSortSpec::default()
        };
        assert_eq!(overlay.visible(&plotted, &everything).len(), 3);

        let completed_only = FilterSortSpec {
            status: StatusFilter::Only(ComplaintStatus::Completed),
            ..FilterSortSpec::default()
        };
        assert!(overlay.visible(&plotted, &completed_only).is_empty());
    }

    #[test]
    fn progress_percent() {
        let progress = OverlayProgress {
            processed: 1,
            total: 3,
            plotted: 1,
        };
        assert_eq!(progress.percent(), 33);
    }
}
