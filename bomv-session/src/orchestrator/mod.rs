//! Session orchestrator
//!
//! Owns the state of one drawing session, sequences gateway calls and keeps
//! at most one detection request in flight. State lives behind a
//! `tokio::sync::RwLock` that is never held across an `.await`: every action
//! snapshots what it needs, releases the lock for the gateway call, then
//! re-acquires it and checks that the world has not moved on before applying
//! the response.

pub mod flight;
pub mod state;

pub use flight::{DetectionFlight, DetectionOutcome};
pub use state::{SessionState, VerificationCounts};

use crate::error::{GatewayError, OrchestratorError, OrchestratorResult};
use crate::gateway::{
    BulkVerifyItem, DetectionConfig, DetectionResponse, ExportFormat, ManualDetectionRequest,
    UploadFile, VerificationGateway, VerifyRequest,
};
use bomv_common::bom::aggregate;
use bomv_common::catalog::PricingLookup;
use bomv_common::config::OrchestratorConfig;
use bomv_common::events::{EventBus, SessionEvent};
use bomv_common::models::{
    BomData, BoundingBox, Detection, Session, SessionStatus, VerificationStatus,
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Behaviour switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Reload the session after installing a detection result
    pub refresh_after_detection: bool,
    /// Re-fetch the session after a bulk verification instead of patching
    pub refresh_after_bulk: bool,
    pub event_capacity: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for OrchestratorOptions {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            refresh_after_detection: config.refresh_after_detection,
            refresh_after_bulk: config.refresh_after_bulk,
            event_capacity: config.event_capacity.max(1),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    flight: Option<DetectionFlight>,
    next_flight_seq: u64,
    load_seq: u64,
}

impl Inner {
    fn session_id(&self) -> Option<String> {
        self.state.session_id().map(str::to_string)
    }

    fn is_current(&self, session_id: &str) -> bool {
        self.state.session_id() == Some(session_id)
    }

    fn is_current_flight(&self, flight: &DetectionFlight) -> bool {
        self.flight.as_ref().map(|f| f.seq) == Some(flight.seq)
    }

    /// Move the local status projection, skipping moves the lifecycle forbids
    fn project(&mut self, next: SessionStatus, events: &EventBus) {
        let Some(detail) = self.state.session.as_mut() else {
            return;
        };
        match detail.session.transition_to(next) {
            Ok(transition) => {
                if transition.old_status != transition.new_status {
                    debug!(
                        session_id = %transition.session_id,
                        from = %transition.old_status,
                        to = %transition.new_status,
                        "Status projected"
                    );
                    events.emit_lossy(SessionEvent::StatusChanged {
                        session_id: transition.session_id,
                        old_status: transition.old_status,
                        new_status: transition.new_status,
                        timestamp: transition.transitioned_at,
                    });
                }
            }
            Err(rejected) => {
                debug!(session_id = %detail.session_id(), "Skipping status projection: {}", rejected);
            }
        }
    }

    /// Verification projection: `verifying`, then `verified` once nothing is pending
    fn project_verification(&mut self, events: &EventBus) {
        self.project(SessionStatus::Verifying, events);
        if self.state.counts().pending == 0 {
            self.project(SessionStatus::Verified, events);
        }
    }

    /// Store an error in the banner without touching the status projection
    fn reject(&mut self, err: &OrchestratorError, events: &EventBus) {
        warn!(session_id = ?self.state.session_id(), "{}", err);
        self.state.error = Some(err.to_string());
        events.emit_lossy(SessionEvent::ErrorRaised {
            session_id: self.session_id(),
            message: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Store a failed session action and project `error`
    fn fail(&mut self, err: &OrchestratorError, events: &EventBus) {
        error!(session_id = ?self.state.session_id(), "{}", err);
        self.state.error = Some(err.to_string());
        if let Some(detail) = self.state.session.as_mut() {
            detail.session.error_message = Some(err.to_string());
        }
        self.project(SessionStatus::Error, events);
        events.emit_lossy(SessionEvent::ErrorRaised {
            session_id: self.session_id(),
            message: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Cancel and drop the current flight, if any
    fn cancel_flight(&mut self, events: &EventBus) -> Option<DetectionFlight> {
        let flight = self.flight.take()?;
        flight.cancel();
        events.emit_lossy(SessionEvent::DetectionCancelled {
            session_id: flight.session_id.clone(),
            request_id: flight.request_id,
            timestamp: Utc::now(),
        });
        Some(flight)
    }

    /// Start load number `load_seq + 1`, cancelling a flight of another session
    fn begin_load(&mut self, session_id: &str, events: &EventBus) -> u64 {
        let other_session = self
            .flight
            .as_ref()
            .is_some_and(|f| f.session_id != session_id);
        if other_session {
            if let Some(flight) = self.cancel_flight(events) {
                info!(
                    session_id = %flight.session_id,
                    request_id = %flight.request_id,
                    "Cancelled detection of previous session"
                );
            }
        }
        self.load_seq += 1;
        self.state.is_loading = true;
        self.state.error = None;
        self.load_seq
    }

    fn snapshot(&self) -> SessionState {
        let mut state = self.state.clone();
        state.is_detecting = self.flight.is_some();
        state
    }
}

/// Session orchestrator handle
///
/// Cloning is cheap; clones share the same session state, so overlapping
/// actions can be driven from separate tasks.
pub struct SessionOrchestrator<G: VerificationGateway> {
    gateway: Arc<G>,
    inner: Arc<RwLock<Inner>>,
    events: EventBus,
    options: OrchestratorOptions,
}

impl<G: VerificationGateway> Clone for SessionOrchestrator<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            inner: Arc::clone(&self.inner),
            events: self.events.clone(),
            options: self.options.clone(),
        }
    }
}

impl<G: VerificationGateway> SessionOrchestrator<G> {
    pub fn new(gateway: Arc<G>, options: OrchestratorOptions) -> Self {
        let events = EventBus::new(options.event_capacity);
        Self {
            gateway,
            inner: Arc::new(RwLock::new(Inner::default())),
            events,
            options,
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> SessionState {
        self.inner.read().await.snapshot()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.inner.read().await.session_id()
    }

    /// Upload a drawing and load the session it creates
    ///
    /// The error is stored in state and also returned.
    pub async fn upload_image(&self, file: UploadFile) -> OrchestratorResult<String> {
        if let Err(message) = file.validate() {
            let err = OrchestratorError::Upload(message);
            self.inner.write().await.reject(&err, &self.events);
            return Err(err);
        }

        {
            let mut inner = self.inner.write().await;
            inner.state.is_loading = true;
            inner.state.error = None;
        }

        info!(filename = %file.filename, size = file.bytes.len(), "Uploading drawing");
        match self.gateway.upload(&file).await {
            Ok(response) => {
                info!(session_id = %response.session_id, "Drawing uploaded");
                self.load_session(&response.session_id).await;
                Ok(response.session_id)
            }
            Err(e) => {
                let err = OrchestratorError::Upload(e.to_string());
                let mut inner = self.inner.write().await;
                inner.state.is_loading = inner.flight.is_some();
                inner.reject(&err, &self.events);
                Err(err)
            }
        }
    }

    /// Fetch a session and its image, replacing all session-scoped state
    ///
    /// Returns `false` when the load failed or was overtaken by a newer load
    /// or a reset.
    pub async fn load_session(&self, session_id: &str) -> bool {
        let seq = self.inner.write().await.begin_load(session_id, &self.events);
        self.fetch_session(session_id, seq).await
    }

    /// Fetch and install a session unless load `seq` has been overtaken
    async fn fetch_session(&self, session_id: &str, seq: u64) -> bool {
        debug!(session_id = %session_id, "Loading session");
        let result = tokio::try_join!(
            self.gateway.get_session(session_id, true),
            self.gateway.get_session_image(session_id, None),
        );

        let mut inner = self.inner.write().await;
        if inner.load_seq != seq {
            debug!(session_id = %session_id, "Discarding stale session load");
            return false;
        }
        inner.state.is_loading = inner.flight.is_some();

        match result {
            Ok((mut detail, image)) => {
                let detections = std::mem::take(&mut detail.detections);
                let bom_data = detail.bom_data.take();

                let same_session = inner.is_current(session_id);
                let selection = inner
                    .state
                    .selected_detection_id
                    .take()
                    .filter(|id| same_session && detections.iter().any(|d| &d.id == id));

                let status = detail.status();
                let detection_count = detections.len();

                inner.state.session = Some(detail);
                inner.state.detections = detections;
                inner.state.bom_data = bom_data;
                inner.state.image = Some(image);
                inner.state.selected_detection_id = selection;

                info!(
                    session_id = %session_id,
                    status = %status,
                    detection_count,
                    "Session loaded"
                );
                self.events.emit_lossy(SessionEvent::SessionLoaded {
                    session_id: session_id.to_string(),
                    status,
                    detection_count,
                    timestamp: Utc::now(),
                });
                true
            }
            Err(e) => {
                let err = OrchestratorError::SessionLoad(e.to_string());
                inner.reject(&err, &self.events);
                false
            }
        }
    }

    /// Run detection on the current session
    pub async fn run_detection(&self, config: DetectionConfig) -> DetectionOutcome {
        self.detect(config, None).await
    }

    /// Run detection, cancelling it if `timeout` elapses first
    pub async fn run_detection_with_timeout(
        &self,
        config: DetectionConfig,
        timeout: Duration,
    ) -> DetectionOutcome {
        self.detect(config, Some(timeout)).await
    }

    async fn detect(&self, config: DetectionConfig, timeout: Option<Duration>) -> DetectionOutcome {
        let flight = {
            let mut inner = self.inner.write().await;
            let Some(session_id) = inner.session_id() else {
                inner.reject(&OrchestratorError::NoActiveSession, &self.events);
                return DetectionOutcome::Failed;
            };
            if let Err(message) = config.validate() {
                inner.reject(&OrchestratorError::InvalidInput(message), &self.events);
                return DetectionOutcome::Failed;
            }

            if let Some(previous) = inner.flight.take() {
                previous.cancel();
                debug!(
                    session_id = %previous.session_id,
                    request_id = %previous.request_id,
                    "Superseding in-flight detection"
                );
            }

            inner.next_flight_seq += 1;
            let flight = DetectionFlight::new(inner.next_flight_seq, session_id);
            inner.flight = Some(flight.clone());
            inner.state.is_loading = true;
            inner.state.error = None;
            inner.project(SessionStatus::Detecting, &self.events);

            self.events.emit_lossy(SessionEvent::DetectionStarted {
                session_id: flight.session_id.clone(),
                request_id: flight.request_id,
                timestamp: Utc::now(),
            });
            flight
        };

        info!(
            session_id = %flight.session_id,
            request_id = %flight.request_id,
            model_id = %config.model_id,
            confidence = config.confidence,
            "Detection started"
        );

        let deadline = async {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };

        // `None` means the caller-side deadline fired
        let result: Option<Result<DetectionResponse, GatewayError>> = tokio::select! {
            biased;
            _ = flight.token.cancelled() => Some(Err(GatewayError::Cancelled)),
            response = self.gateway.detect(&flight.session_id, &config, flight.token.clone()) => Some(response),
            _ = deadline => None,
        };

        let mut inner = self.inner.write().await;

        let Some(result) = result else {
            if inner.is_current_flight(&flight) {
                inner.cancel_flight(&self.events);
                inner.state.is_loading = false;
                inner.state.error = None;
                info!(
                    session_id = %flight.session_id,
                    request_id = %flight.request_id,
                    "Detection timed out, cancelled"
                );
                return DetectionOutcome::TimedOut;
            }
            return discard(&inner, &flight, &self.events);
        };

        if !inner.is_current_flight(&flight) {
            return discard(&inner, &flight, &self.events);
        }

        inner.flight = None;
        inner.state.is_loading = false;

        match result {
            Ok(response) => {
                let count = response.detections.len();
                inner.state.detections = response.detections;
                if let Some(detail) = inner.state.session.as_mut() {
                    detail.image_width = response.image_width;
                    detail.image_height = response.image_height;
                    detail.session.detection_count = count;
                }
                let keep_selection = inner
                    .state
                    .selected_detection_id
                    .as_deref()
                    .is_some_and(|id| inner.state.detection(id).is_some());
                if !keep_selection {
                    inner.state.selected_detection_id = None;
                }
                inner.project(SessionStatus::Detected, &self.events);

                info!(
                    session_id = %flight.session_id,
                    request_id = %flight.request_id,
                    detection_count = count,
                    "Detection committed"
                );
                self.events.emit_lossy(SessionEvent::DetectionCommitted {
                    session_id: flight.session_id.clone(),
                    request_id: flight.request_id,
                    detection_count: count,
                    timestamp: Utc::now(),
                });
                let refresh = self
                    .options
                    .refresh_after_detection
                    .then(|| inner.begin_load(&flight.session_id, &self.events));
                drop(inner);

                if let Some(seq) = refresh {
                    self.fetch_session(&flight.session_id, seq).await;
                }
                DetectionOutcome::Committed { count }
            }
            Err(GatewayError::Cancelled) => {
                // Gateway abandoned the request on its own
                inner.state.error = None;
                DetectionOutcome::Cancelled
            }
            Err(e) => {
                inner.fail(&OrchestratorError::Detection(e.to_string()), &self.events);
                DetectionOutcome::Failed
            }
        }
    }

    /// Cancel the in-flight detection
    ///
    /// Committed detections are kept. Returns `true` if a request was cancelled.
    pub async fn cancel_detection(&self) -> bool {
        let mut inner = self.inner.write().await;
        let cancelled = inner.cancel_flight(&self.events);
        inner.state.is_loading = false;
        inner.state.error = None;
        if let Some(flight) = &cancelled {
            info!(
                session_id = %flight.session_id,
                request_id = %flight.request_id,
                "Detection cancelled"
            );
        }
        cancelled.is_some()
    }

    /// Verify a single machine detection
    pub async fn verify_detection(
        &self,
        detection_id: &str,
        status: VerificationStatus,
        modified_class_name: Option<String>,
    ) -> bool {
        let session_id = {
            let mut inner = self.inner.write().await;
            match check_verification(&inner, detection_id, status, modified_class_name.as_deref()) {
                Ok(session_id) => session_id,
                Err(err) => {
                    inner.reject(&err, &self.events);
                    return false;
                }
            }
        };

        let modified_class_name = if status == VerificationStatus::Modified {
            modified_class_name.map(|name| name.trim().to_string())
        } else {
            None
        };
        let request = VerifyRequest {
            detection_id: detection_id.to_string(),
            status,
            modified_class_name: modified_class_name.clone(),
        };

        let result = self.gateway.verify(&session_id, &request).await;

        let mut inner = self.inner.write().await;
        if !inner.is_current(&session_id) {
            debug!(session_id = %session_id, "Session changed, dropping verification result");
            return false;
        }

        match result {
            Ok(()) => {
                let Some(detection) = inner.state.detection_mut(detection_id) else {
                    return false;
                };
                detection.verification_status = status;
                if modified_class_name.is_some() {
                    detection.modified_class_name = modified_class_name;
                }
                inner.project_verification(&self.events);

                debug!(session_id = %session_id, detection_id = %detection_id, status = %status, "Detection verified");
                self.events.emit_lossy(SessionEvent::DetectionUpdated {
                    session_id,
                    detection_id: detection_id.to_string(),
                    status,
                    timestamp: Utc::now(),
                });
                true
            }
            Err(e) => {
                inner.fail(&OrchestratorError::Verification(e.to_string()), &self.events);
                false
            }
        }
    }

    /// Approve every detection that is neither approved nor manual
    pub async fn approve_all(&self) -> usize {
        self.bulk_verify(VerificationStatus::Approved).await
    }

    /// Reject every detection that is neither rejected nor manual
    pub async fn reject_all(&self) -> usize {
        self.bulk_verify(VerificationStatus::Rejected).await
    }

    async fn bulk_verify(&self, target: VerificationStatus) -> usize {
        let (session_id, items, load_seq) = {
            let mut inner = self.inner.write().await;
            let Some(session_id) = inner.session_id() else {
                inner.reject(&OrchestratorError::NoActiveSession, &self.events);
                return 0;
            };
            let items: Vec<BulkVerifyItem> = inner
                .state
                .detections
                .iter()
                .filter(|d| d.verification_status != target && !d.is_manual())
                .map(|d| BulkVerifyItem {
                    detection_id: d.id.clone(),
                    status: target,
                })
                .collect();
            (session_id, items, inner.load_seq)
        };

        if items.is_empty() {
            debug!(session_id = %session_id, status = %target, "Nothing to verify");
            return 0;
        }

        let count = items.len();
        info!(session_id = %session_id, status = %target, count, "Bulk verification");
        let result = self.gateway.bulk_verify(&session_id, &items).await;

        if let Err(e) = result {
            let mut inner = self.inner.write().await;
            if inner.is_current(&session_id) {
                inner.fail(&OrchestratorError::Verification(e.to_string()), &self.events);
            }
            return 0;
        }

        let refresh = {
            let mut inner = self.inner.write().await;
            if !inner.is_current(&session_id) {
                debug!(session_id = %session_id, "Session changed, dropping bulk result");
                return 0;
            }
            let ids: HashSet<&str> = items.iter().map(|i| i.detection_id.as_str()).collect();
            for detection in inner.state.detections.iter_mut() {
                if ids.contains(detection.id.as_str()) {
                    detection.verification_status = target;
                }
            }
            inner.project_verification(&self.events);

            // A load started meanwhile owns the next install
            (self.options.refresh_after_bulk && inner.load_seq == load_seq)
                .then(|| inner.begin_load(&session_id, &self.events))
        };

        self.events.emit_lossy(SessionEvent::BulkVerified {
            session_id: session_id.clone(),
            status: target,
            count,
            timestamp: Utc::now(),
        });

        if let Some(seq) = refresh {
            self.fetch_session(&session_id, seq).await;
        }
        count
    }

    /// Add an operator-drawn detection
    pub async fn add_manual_detection(&self, class_name: &str, bbox: BoundingBox) -> Option<Detection> {
        let class_name = class_name.trim();
        let session_id = {
            let mut inner = self.inner.write().await;
            let Some(session_id) = inner.session_id() else {
                inner.reject(&OrchestratorError::NoActiveSession, &self.events);
                return None;
            };
            if class_name.is_empty() {
                let err = OrchestratorError::InvalidInput("class name must not be empty".to_string());
                inner.reject(&err, &self.events);
                return None;
            }
            if !bbox.is_valid() {
                let err = OrchestratorError::InvalidInput(format!(
                    "invalid bounding box ({}, {}, {}, {})",
                    bbox.x1, bbox.y1, bbox.x2, bbox.y2
                ));
                inner.reject(&err, &self.events);
                return None;
            }
            session_id
        };

        let request = ManualDetectionRequest {
            class_name: class_name.to_string(),
            bbox,
        };
        let result = self.gateway.add_manual(&session_id, &request).await;

        let mut inner = self.inner.write().await;
        if !inner.is_current(&session_id) {
            debug!(session_id = %session_id, "Session changed, dropping manual detection");
            return None;
        }

        match result {
            Ok(detection) => {
                inner.state.detections.push(detection.clone());
                let count = inner.state.detections.len();
                if let Some(detail) = inner.state.session.as_mut() {
                    detail.session.detection_count = count;
                }
                info!(session_id = %session_id, detection_id = %detection.id, class_name = %class_name, "Manual detection added");
                self.events.emit_lossy(SessionEvent::DetectionAdded {
                    session_id,
                    detection_id: detection.id.clone(),
                    timestamp: Utc::now(),
                });
                Some(detection)
            }
            Err(e) => {
                inner.fail(&OrchestratorError::Verification(e.to_string()), &self.events);
                None
            }
        }
    }

    pub async fn delete_detection(&self, detection_id: &str) -> bool {
        let session_id = {
            let mut inner = self.inner.write().await;
            match inner.session_id() {
                Some(id) => id,
                None => {
                    inner.reject(&OrchestratorError::NoActiveSession, &self.events);
                    return false;
                }
            }
        };

        let result = self.gateway.delete_detection(&session_id, detection_id).await;

        let mut inner = self.inner.write().await;
        if !inner.is_current(&session_id) {
            return false;
        }

        match result {
            Ok(()) => {
                inner.state.detections.retain(|d| d.id != detection_id);
                if inner.state.selected_detection_id.as_deref() == Some(detection_id) {
                    inner.state.selected_detection_id = None;
                }
                let count = inner.state.detections.len();
                if let Some(detail) = inner.state.session.as_mut() {
                    detail.session.detection_count = count;
                }
                info!(session_id = %session_id, detection_id = %detection_id, "Detection deleted");
                self.events.emit_lossy(SessionEvent::DetectionDeleted {
                    session_id,
                    detection_id: detection_id.to_string(),
                    timestamp: Utc::now(),
                });
                true
            }
            Err(e) => {
                inner.fail(&OrchestratorError::Verification(e.to_string()), &self.events);
                false
            }
        }
    }

    /// Ask the gateway for a BOM snapshot of the current session
    pub async fn generate_bom(&self) -> Option<BomData> {
        let session_id = {
            let mut inner = self.inner.write().await;
            let Some(session_id) = inner.session_id() else {
                inner.reject(&OrchestratorError::NoActiveSession, &self.events);
                return None;
            };
            inner.state.is_loading = true;
            inner.state.error = None;
            inner.project(SessionStatus::GeneratingBom, &self.events);
            session_id
        };

        info!(session_id = %session_id, "Generating BOM");
        let result = self.gateway.generate_bom(&session_id).await;

        let mut inner = self.inner.write().await;
        inner.state.is_loading = inner.flight.is_some();
        if !inner.is_current(&session_id) {
            debug!(session_id = %session_id, "Session changed, dropping BOM");
            return None;
        }

        match result {
            Ok(bom) => {
                inner.state.bom_data = Some(bom.clone());
                if let Some(detail) = inner.state.session.as_mut() {
                    detail.session.bom_generated = true;
                }
                inner.project(SessionStatus::Completed, &self.events);

                info!(
                    session_id = %session_id,
                    total_items = bom.summary.total_items,
                    total = bom.summary.total,
                    "BOM generated"
                );
                self.events.emit_lossy(SessionEvent::BomGenerated {
                    session_id,
                    total_items: bom.summary.total_items,
                    total: bom.summary.total,
                    timestamp: Utc::now(),
                });
                Some(bom)
            }
            Err(e) => {
                inner.fail(&OrchestratorError::BomGeneration(e.to_string()), &self.events);
                None
            }
        }
    }

    /// Local BOM preview of the current detections, no network
    pub async fn preview_bom(&self, pricing: &dyn PricingLookup) -> Option<BomData> {
        let inner = self.inner.read().await;
        let session_id = inner.state.session_id()?;
        Some(aggregate(session_id, &inner.state.detections, pricing))
    }

    /// Move the selection cursor; unknown ids clear it
    pub async fn select_detection(&self, detection_id: Option<&str>) -> bool {
        let mut inner = self.inner.write().await;
        let selected = detection_id
            .filter(|id| inner.state.detection(id).is_some())
            .map(str::to_string);
        let found = selected.is_some();
        inner.state.selected_detection_id = selected;
        found
    }

    /// Clear all session-scoped state
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.cancel_flight(&self.events);
        inner.load_seq += 1;
        inner.state = SessionState::default();
        debug!("Session state reset");
        self.events.emit_lossy(SessionEvent::Reset {
            timestamp: Utc::now(),
        });
    }

    /// Dismiss the error banner
    pub async fn clear_error(&self) {
        self.inner.write().await.state.error = None;
    }

    pub async fn list_sessions(&self, limit: usize) -> Option<Vec<Session>> {
        match self.gateway.list_sessions(limit).await {
            Ok(sessions) => Some(sessions),
            Err(e) => {
                let err = OrchestratorError::SessionLoad(e.to_string());
                self.inner.write().await.reject(&err, &self.events);
                None
            }
        }
    }

    /// Delete a session on the server; resets local state if it was loaded
    pub async fn delete_session(&self, session_id: &str) -> bool {
        match self.gateway.delete_session(session_id).await {
            Ok(()) => {
                info!(session_id = %session_id, "Session deleted");
                let is_current = self.inner.read().await.is_current(session_id);
                if is_current {
                    self.reset().await;
                }
                true
            }
            Err(e) => {
                let err = OrchestratorError::SessionDelete(e.to_string());
                self.inner.write().await.reject(&err, &self.events);
                false
            }
        }
    }

    /// Export download URL for the current session
    pub async fn export_url(&self, format: ExportFormat) -> Option<String> {
        let session_id = self.session_id().await?;
        match self.gateway.export_url(&session_id, format) {
            Ok(url) => Some(url),
            Err(e) => {
                let err = OrchestratorError::InvalidInput(e.to_string());
                self.inner.write().await.reject(&err, &self.events);
                None
            }
        }
    }
}

/// Drop a response whose flight is no longer current
fn discard(inner: &Inner, flight: &DetectionFlight, events: &EventBus) -> DetectionOutcome {
    debug!(
        session_id = %flight.session_id,
        request_id = %flight.request_id,
        "Discarding detection response"
    );
    events.emit_lossy(SessionEvent::DetectionDiscarded {
        session_id: flight.session_id.clone(),
        request_id: flight.request_id,
        timestamp: Utc::now(),
    });
    if inner.flight.is_some() {
        DetectionOutcome::Superseded
    } else {
        DetectionOutcome::Cancelled
    }
}

fn check_verification(
    inner: &Inner,
    detection_id: &str,
    status: VerificationStatus,
    modified_class_name: Option<&str>,
) -> Result<String, OrchestratorError> {
    let session_id = inner.session_id().ok_or(OrchestratorError::NoActiveSession)?;

    if !status.is_verification_target() {
        return Err(OrchestratorError::InvalidInput(format!(
            "{} is not a verification status",
            status
        )));
    }
    if status == VerificationStatus::Modified
        && modified_class_name.map_or(true, |name| name.trim().is_empty())
    {
        return Err(OrchestratorError::InvalidInput(
            "modified requires a class name".to_string(),
        ));
    }

    let detection = inner.state.detection(detection_id).ok_or_else(|| {
        OrchestratorError::InvalidInput(format!("detection not found: {}", detection_id))
    })?;
    if detection.is_manual() {
        return Err(OrchestratorError::InvalidInput(
            "manual detections cannot be verified".to_string(),
        ));
    }

    Ok(session_id)
}
