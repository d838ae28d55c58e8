use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::api::{ComplaintBackend, ListQuery};
use crate::complaint::{Complaint, ComplaintId, ComplaintPatch, ComplaintStatus, NewComplaint};
use crate::debounce::Debouncer;
use crate::errors::{AppError, AppResult};
use crate::notify::{NoticeBoard, NoticeKind};
use crate::pipeline::{derive, FilterSortSpec};

const LOADING_MESSAGE: &str = "Загрузка жалоб...";
const LOADED_MESSAGE: &str = "Жалобы успешно загружены";
const STATUS_FAILED_MESSAGE: &str = "Не удалось обновить статус жалобы";

/// Client-side copy of the complaint collection.
///
/// The collection is only ever replaced wholesale, so a snapshot handed to a
/// view stays consistent while a refresh is in flight. Local records change
/// only after the backend acknowledges a write.
pub struct ComplaintStore {
    backend: Arc<dyn ComplaintBackend>,
    snapshot: Mutex<Arc<[Complaint]>>,
    loading: AtomicUsize,
    notices: NoticeBoard,
    search: Debouncer,
}

impl ComplaintStore {
    pub fn new(
        backend: Arc<dyn ComplaintBackend>,
        notices: NoticeBoard,
        search_debounce: Duration,
    ) -> Self {
        Self {
            backend,
            snapshot: Mutex::new(Arc::from(Vec::new())),
            loading: AtomicUsize::new(0),
            notices,
            search: Debouncer::new(search_debounce),
        }
    }

    pub fn snapshot(&self) -> Arc<[Complaint]> {
        Arc::clone(&self.snapshot.lock())
    }

    /// True while any refresh is still waiting on the backend.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn view(&self, spec: &FilterSortSpec) -> Vec<Complaint> {
        derive(&self.snapshot(), spec)
    }

    pub async fn refresh(&self, query: &ListQuery) -> AppResult<Arc<[Complaint]>> {
        let loading = LoadingGuard::enter(&self.loading);
        self.notices.post(NoticeKind::Loading, LOADING_MESSAGE);

        let result = self.backend.list(query).await;
        drop(loading);
        match result {
            Ok(complaints) => {
                info!(count = complaints.len(), "complaints loaded");
                let snapshot: Arc<[Complaint]> = Arc::from(complaints);
                *self.snapshot.lock() = Arc::clone(&snapshot);
                self.notices.post(NoticeKind::Success, LOADED_MESSAGE);
                Ok(snapshot)
            }
            Err(err) => {
                warn!(?err, ?query, "failed to load complaints");
                self.notices.post(NoticeKind::Error, format!("Ошибка: {err}"));
                Err(err)
            }
        }
    }

    /// Search-box entry point: only the last query of a typing burst is sent.
    pub async fn refresh_debounced(&self, query: ListQuery) -> Option<AppResult<Arc<[Complaint]>>> {
        self.search.run(|| self.refresh(&query)).await
    }

    pub async fn change_status(
        &self,
        id: &ComplaintId,
        status: ComplaintStatus,
    ) -> AppResult<Complaint> {
        let acknowledged = match self.backend.change_status(id, status).await {
            Ok(record) => record,
            Err(err) => {
                warn!(?err, %id, %status, "status change rejected");
                self.notices
                    .post(NoticeKind::Error, format!("Ошибка: {STATUS_FAILED_MESSAGE}"));
                return Err(err);
            }
        };

        let target = acknowledged.id.clone().unwrap_or_else(|| id.clone());
        let mut snapshot = self.snapshot.lock();
        let updated: Vec<Complaint> = snapshot
            .iter()
            .map(|complaint| {
                if complaint.id.as_ref() == Some(&target) {
                    let mut record = acknowledged.clone();
                    record.id = Some(target.clone());
                    record
                } else {
                    complaint.clone()
                }
            })
            .collect();
        *snapshot = Arc::from(updated);
        Ok(acknowledged)
    }

    /// Submitting never depends on address resolution; an empty address or a
    /// coordinate fallback is sent as-is.
    pub async fn create(&self, complaint: &NewComplaint) -> AppResult<()> {
        self.backend
            .create(complaint)
            .await
            .map_err(|err| self.report("failed to create complaint", err))?;
        self.refresh(&ListQuery::default()).await.map(|_| ())
    }

    pub async fn edit(&self, id: &ComplaintId, patch: &ComplaintPatch) -> AppResult<()> {
        self.backend
            .edit(id, patch)
            .await
            .map_err(|err| self.report("failed to edit complaint", err))?;
        self.refresh(&ListQuery::default()).await.map(|_| ())
    }

    pub async fn delete(&self, id: &ComplaintId) -> AppResult<()> {
        self.backend
            .delete(id)
            .await
            .map_err(|err| self.report("failed to delete complaint", err))?;
        self.refresh(&ListQuery::default()).await.map(|_| ())
    }

    pub async fn recommendation(&self, complaint: &str) -> AppResult<String> {
        self.backend
            .recommendation(complaint)
            .await
            .map_err(|err| self.report("failed to fetch recommendation", err))
    }

    fn report(&self, context: &'static str, err: AppError) -> AppError {
        warn!(?err, "{context}");
        self.notices.post(NoticeKind::Error, format!("Ошибка: {err}"));
        err
    }
}

/// Counts one refresh in flight until dropped, including when the refresh
/// future itself is cancelled.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
