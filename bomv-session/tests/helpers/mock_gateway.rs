//! Scriptable in-memory verification gateway
//!
//! Keeps sessions in memory the way the real gateway persists them, counts
//! calls per method, and lets a test hold individual responses behind
//! oneshot gates to force response ordering.

use async_trait::async_trait;
use bomv_common::bom::aggregate;
use bomv_common::catalog::PriceCatalog;
use bomv_common::models::{
    BomData, BoundingBox, Detection, Session, SessionDetail, SessionStatus, VerificationStatus,
};
use bomv_session::error::{GatewayError, GatewayResult};
use bomv_session::gateway::{
    BulkVerifyItem, DetectionConfig, DetectionResponse, ExportFormat, ManualDetectionRequest,
    SessionImage, UploadFile, UploadResponse, VerificationGateway, VerifyRequest,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub const IMAGE_WIDTH: u32 = 1920;
pub const IMAGE_HEIGHT: u32 = 1080;

/// One scripted detection response
struct DetectScript {
    result: Result<Vec<Detection>, String>,
    gate: Option<oneshot::Receiver<()>>,
}

#[derive(Default)]
struct MockState {
    sessions: BTreeMap<String, SessionDetail>,
    detect_queue: VecDeque<DetectScript>,
    session_gates: VecDeque<oneshot::Receiver<()>>,
    action_gates: HashMap<&'static str, VecDeque<oneshot::Receiver<()>>>,
    failures: HashMap<&'static str, String>,
    calls: HashMap<&'static str, usize>,
    detect_configs: Vec<DetectionConfig>,
    bulk_requests: Vec<Vec<BulkVerifyItem>>,
    catalog: PriceCatalog,
    next_id: usize,
}

#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, detail: SessionDetail) -> Self {
        self.insert_session(detail);
        self
    }

    pub fn with_catalog(self, catalog: PriceCatalog) -> Self {
        self.lock().catalog = catalog;
        self
    }

    pub fn insert_session(&self, detail: SessionDetail) {
        self.lock()
            .sessions
            .insert(detail.session_id().to_string(), detail);
    }

    /// Stored detections of a session, as the server sees them
    pub fn stored_detections(&self, session_id: &str) -> Vec<Detection> {
        self.lock()
            .sessions
            .get(session_id)
            .map(|s| s.detections.clone())
            .unwrap_or_default()
    }

    pub fn push_detect_ok(&self, detections: Vec<Detection>) {
        self.lock().detect_queue.push_back(DetectScript {
            result: Ok(detections),
            gate: None,
        });
    }

    pub fn push_detect_err(&self, message: &str) {
        self.lock().detect_queue.push_back(DetectScript {
            result: Err(message.to_string()),
            gate: None,
        });
    }

    /// Detection response held until the returned sender fires
    pub fn push_detect_gated(&self, detections: Vec<Detection>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().detect_queue.push_back(DetectScript {
            result: Ok(detections),
            gate: Some(rx),
        });
        tx
    }

    /// Next `get_session` call waits until the returned sender fires
    pub fn gate_next_get_session(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().session_gates.push_back(rx);
        tx
    }

    /// Next call of `method` waits until the returned sender fires, then
    /// applies its change
    pub fn gate_next(&self, method: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().action_gates.entry(method).or_default().push_back(rx);
        tx
    }

    /// Next call of `method` fails with an API error
    pub fn fail_next(&self, method: &'static str, message: &str) {
        self.lock().failures.insert(method, message.to_string());
    }

    pub fn calls(&self, method: &str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or(0)
    }

    pub fn detect_configs(&self) -> Vec<DetectionConfig> {
        self.lock().detect_configs.clone()
    }

    pub fn bulk_requests(&self) -> Vec<Vec<BulkVerifyItem>> {
        self.lock().bulk_requests.clone()
    }

    /// Poll until `method` has been called `count` times
    pub async fn wait_for_calls(&self, method: &str, count: usize) {
        let wait = async {
            while self.calls(method) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {} x{}", method, count));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Count the call and consume an injected failure
    fn enter(&self, method: &'static str) -> GatewayResult<()> {
        let mut state = self.lock();
        *state.calls.entry(method).or_insert(0) += 1;
        match state.failures.remove(method) {
            Some(message) => Err(GatewayError::Api {
                status: 500,
                message,
            }),
            None => Ok(()),
        }
    }

    async fn pass_gate(&self, method: &'static str) {
        let gate = self
            .lock()
            .action_gates
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }

    fn with_stored<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionDetail, &mut usize) -> GatewayResult<T>,
    ) -> GatewayResult<T> {
        let mut state = self.lock();
        let MockState {
            sessions, next_id, ..
        } = &mut *state;
        let detail = sessions
            .get_mut(session_id)
            .ok_or_else(|| GatewayError::NotFound(format!("session {}", session_id)))?;
        f(detail, next_id)
    }
}

#[async_trait]
impl VerificationGateway for MockGateway {
    async fn upload(&self, file: &UploadFile) -> GatewayResult<UploadResponse> {
        self.enter("upload")?;
        let mut state = self.lock();
        state.next_id += 1;
        let session_id = format!("session-{}", state.next_id);
        let mut session = Session::new(session_id.clone(), file.filename.clone());
        session.status = SessionStatus::Uploaded;
        state.sessions.insert(
            session_id.clone(),
            SessionDetail {
                session,
                detections: Vec::new(),
                approved_count: 0,
                rejected_count: 0,
                bom_data: None,
                image_width: IMAGE_WIDTH,
                image_height: IMAGE_HEIGHT,
            },
        );
        Ok(UploadResponse { session_id })
    }

    async fn get_session(
        &self,
        session_id: &str,
        include_detections: bool,
    ) -> GatewayResult<SessionDetail> {
        self.enter("get_session")?;
        let gate = self.lock().session_gates.pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let state = self.lock();
        let mut detail = state
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("session {}", session_id)))?;
        if !include_detections {
            detail.detections.clear();
        }
        Ok(detail)
    }

    async fn get_session_image(
        &self,
        session_id: &str,
        _image_id: Option<&str>,
    ) -> GatewayResult<SessionImage> {
        self.enter("get_session_image")?;
        if !self.lock().sessions.contains_key(session_id) {
            return Err(GatewayError::NotFound(format!("session {}", session_id)));
        }
        Ok(SessionImage {
            mime_type: "image/png".to_string(),
            image_base64: "iVBORw0K".to_string(),
        })
    }

    async fn detect(
        &self,
        session_id: &str,
        config: &DetectionConfig,
        cancel: CancellationToken,
    ) -> GatewayResult<DetectionResponse> {
        let script = {
            let mut state = self.lock();
            state.detect_configs.push(config.clone());
            state.detect_queue.pop_front()
        };
        self.enter("detect")?;

        let script = script.ok_or_else(|| GatewayError::Parse("no scripted detection".to_string()))?;

        if let Some(gate) = script.gate {
            tokio::select! {
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                _ = gate => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let detections = script.result.map_err(|message| GatewayError::Api {
            status: 500,
            message,
        })?;

        self.with_stored(session_id, |detail, _| {
            detail.detections = detections.clone();
            detail.session.detection_count = detections.len();
            detail.session.status = SessionStatus::Detected;
            Ok(())
        })?;

        Ok(DetectionResponse {
            detections,
            image_width: IMAGE_WIDTH,
            image_height: IMAGE_HEIGHT,
        })
    }

    async fn verify(&self, session_id: &str, request: &VerifyRequest) -> GatewayResult<()> {
        self.enter("verify")?;
        self.pass_gate("verify").await;
        self.with_stored(session_id, |detail, _| {
            let detection = detail
                .detections
                .iter_mut()
                .find(|d| d.id == request.detection_id)
                .ok_or_else(|| GatewayError::NotFound(request.detection_id.clone()))?;
            detection.verification_status = request.status;
            if request.modified_class_name.is_some() {
                detection.modified_class_name = request.modified_class_name.clone();
            }
            Ok(())
        })
    }

    async fn bulk_verify(&self, session_id: &str, items: &[BulkVerifyItem]) -> GatewayResult<()> {
        self.lock().bulk_requests.push(items.to_vec());
        self.enter("bulk_verify")?;
        self.pass_gate("bulk_verify").await;
        self.with_stored(session_id, |detail, _| {
            for item in items {
                if let Some(detection) = detail
                    .detections
                    .iter_mut()
                    .find(|d| d.id == item.detection_id)
                {
                    detection.verification_status = item.status;
                }
            }
            Ok(())
        })
    }

    async fn add_manual(
        &self,
        session_id: &str,
        request: &ManualDetectionRequest,
    ) -> GatewayResult<Detection> {
        self.enter("add_manual")?;
        self.pass_gate("add_manual").await;
        self.with_stored(session_id, |detail, next_id| {
            *next_id += 1;
            let detection = manual_detection(&format!("manual-{}", next_id), &request.class_name, request.bbox);
            detail.detections.push(detection.clone());
            Ok(detection)
        })
    }

    async fn delete_detection(&self, session_id: &str, detection_id: &str) -> GatewayResult<()> {
        self.enter("delete_detection")?;
        self.pass_gate("delete_detection").await;
        self.with_stored(session_id, |detail, _| {
            let before = detail.detections.len();
            detail.detections.retain(|d| d.id != detection_id);
            if detail.detections.len() == before {
                return Err(GatewayError::NotFound(detection_id.to_string()));
            }
            Ok(())
        })
    }

    async fn generate_bom(&self, session_id: &str) -> GatewayResult<BomData> {
        self.enter("generate_bom")?;
        self.pass_gate("generate_bom").await;
        let mut state = self.lock();
        let MockState {
            sessions, catalog, ..
        } = &mut *state;
        let detail = sessions
            .get_mut(session_id)
            .ok_or_else(|| GatewayError::NotFound(format!("session {}", session_id)))?;
        let bom = aggregate(session_id, &detail.detections, &*catalog);
        detail.bom_data = Some(bom.clone());
        detail.session.bom_generated = true;
        detail.session.status = SessionStatus::Completed;
        Ok(bom)
    }

    async fn delete_session(&self, session_id: &str) -> GatewayResult<()> {
        self.enter("delete_session")?;
        self.lock()
            .sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(format!("session {}", session_id)))
    }

    async fn list_sessions(&self, limit: usize) -> GatewayResult<Vec<Session>> {
        self.enter("list_sessions")?;
        Ok(self
            .lock()
            .sessions
            .values()
            .take(limit)
            .map(|detail| detail.session.clone())
            .collect())
    }

    fn export_url(&self, session_id: &str, format: ExportFormat) -> GatewayResult<String> {
        Ok(format!("mock://bom/{}/download?format={}", session_id, format))
    }
}

pub fn manual_detection(id: &str, class_name: &str, bbox: BoundingBox) -> Detection {
    Detection {
        id: id.to_string(),
        class_id: -1,
        class_name: class_name.to_string(),
        confidence: 1.0,
        bbox,
        model_id: "manual".to_string(),
        verification_status: VerificationStatus::Manual,
        modified_class_name: None,
        modified_bbox: None,
    }
}
