//! In-memory ports shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use learning_space_core::{
    AgentReply, AgentWorkflowService, ChangeFeed, ContentKind, FeedEvent, Language, LearningSpace,
    LearningSpaceRepository, NewLearningSpace, ObjectStorage, PortError, PortResult,
    ProfileUpdate, RemoteActionGateway, SpaceUpdate, StoredObject, StudentProfile, UploadPolicy,
    WorkflowRequest,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use uuid::Uuid;

// --- Repository ---

#[derive(Default)]
pub struct InMemoryRepository {
    rows: Mutex<HashMap<Uuid, LearningSpace>>,
    profiles: Mutex<HashMap<String, StudentProfile>>,
    pub fail_updates: AtomicBool,
}

impl InMemoryRepository {
    pub fn insert(&self, space: LearningSpace) {
        self.rows.lock().unwrap().insert(space.id, space);
    }

    pub fn row(&self, id: Uuid) -> Option<LearningSpace> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl LearningSpaceRepository for InMemoryRepository {
    async fn create(&self, new_space: NewLearningSpace) -> PortResult<LearningSpace> {
        let space = LearningSpace {
            id: Uuid::new_v4(),
            user_id: new_space.user_id,
            topic: new_space.topic,
            language: new_space.language,
            pdf_source: new_space.pdf_source,
            audio_source: new_space.audio_source,
            summary_notes: None,
            flashcards: None,
            quiz: None,
            recommendations: None,
            audio_overview: None,
            audio_script: None,
            mindmap: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.insert(space.clone());
        Ok(space)
    }

    async fn get(&self, id: Uuid) -> PortResult<LearningSpace> {
        self.row(id)
            .ok_or_else(|| PortError::NotFound(format!("learning space {}", id)))
    }

    async fn list_by_user(&self, user_id: &str) -> PortResult<Vec<LearningSpace>> {
        let mut spaces: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        spaces.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(spaces)
    }

    async fn update(&self, id: Uuid, update: &SpaceUpdate) -> PortResult<LearningSpace> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(PortError::Upstream {
                status: 503,
                body: "database unavailable".into(),
            });
        }
        let mut rows = self.rows.lock().unwrap();
        let space = rows
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("learning space {}", id)))?;
        update.apply_to(space);
        space.version += 1;
        space.updated_at = Some(Utc::now());
        Ok(space.clone())
    }

    async fn delete(&self, id: Uuid, user_id: &str) -> PortResult<()> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get(&id) {
            Some(space) if space.user_id == user_id => {
                rows.remove(&id);
                Ok(())
            }
            _ => Err(PortError::NotFound(format!("learning space {}", id))),
        }
    }

    async fn get_profile(&self, user_id: &str) -> PortResult<Option<StudentProfile>> {
        Ok(self.profiles.lock().unwrap().get(user_id).cloned())
    }

    async fn upsert_profile(&self, user_id: &str, profile: &ProfileUpdate) -> PortResult<StudentProfile> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(PortError::Upstream {
                status: 503,
                body: "database unavailable".into(),
            });
        }
        let saved = StudentProfile {
            user_id: user_id.to_string(),
            grade_level: profile.grade_level.clone(),
            language: profile.language,
            gender: profile.gender.clone(),
            updated_at: Some(Utc::now()),
        };
        self.profiles
            .lock()
            .unwrap()
            .insert(user_id.to_string(), saved.clone());
        Ok(saved)
    }
}

// --- Agent ---

pub type Script = Box<dyn Fn(ContentKind) -> PortResult<AgentReply> + Send + Sync>;

/// A scripted agent. Each call to `invoke_workflow` records the repository row
/// as it was at that moment.
pub struct FakeAgent {
    repository: Arc<InMemoryRepository>,
    script: Script,
    /// When set, `generate` waits for a permit before answering.
    pub gate: Option<Arc<Semaphore>>,
    pub fail_deletes: AtomicBool,
    pub invocations: Mutex<Vec<(WorkflowRequest, Option<LearningSpace>)>>,
    pub generations: Mutex<Vec<(ContentKind, WorkflowRequest)>>,
    pub deleted: Mutex<Vec<Uuid>>,
}

impl FakeAgent {
    pub fn new(repository: Arc<InMemoryRepository>, script: Script) -> Self {
        Self {
            repository,
            script,
            gate: None,
            fail_deletes: AtomicBool::new(false),
            invocations: Mutex::new(Vec::new()),
            generations: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn accepting(repository: Arc<InMemoryRepository>) -> Self {
        Self::new(repository, Box::new(|_| Ok(success(None))))
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentWorkflowService for FakeAgent {
    async fn invoke_workflow(&self, request: &WorkflowRequest) -> PortResult<AgentReply> {
        let row = self.repository.row(request.learning_space_id);
        self.invocations.lock().unwrap().push((request.clone(), row));
        (self.script)(ContentKind::Summary)
    }

    async fn generate(&self, kind: ContentKind, request: &WorkflowRequest) -> PortResult<AgentReply> {
        self.generations.lock().unwrap().push((kind, request.clone()));
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        (self.script)(kind)
    }

    async fn notify_deleted(&self, space_id: Uuid, _user_id: &str) -> PortResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(PortError::Network("connection refused".into()));
        }
        self.deleted.lock().unwrap().push(space_id);
        Ok(())
    }
}

pub fn success(payload: Option<(&str, serde_json::Value)>) -> AgentReply {
    let mut reply = AgentReply {
        success: Some(true),
        ..Default::default()
    };
    if let Some((field, value)) = payload {
        reply.payload.insert(field.to_string(), value);
    }
    reply
}

// --- Storage ---

#[derive(Default)]
pub struct FakeStorage {
    pub fail: AtomicBool,
    pub objects: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put(&self, path: &str, _content_type: &str, data: Bytes) -> PortResult<StoredObject> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Upstream {
                status: 413,
                body: "Payload too large".into(),
            });
        }
        self.objects.lock().unwrap().push((path.to_string(), data.len()));
        Ok(StoredObject {
            path: path.to_string(),
            public_url: format!("https://files.test/{}", path),
        })
    }
}

// --- Change feed ---

/// A feed whose events are pushed by the test through `sender`.
pub struct ChannelFeed {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<FeedEvent>>>,
}

impl ChannelFeed {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedSender<FeedEvent>) {
        let (sender, receiver) = mpsc::unbounded();
        let feed = Arc::new(Self {
            receiver: Mutex::new(Some(receiver)),
        });
        (feed, sender)
    }
}

#[async_trait]
impl ChangeFeed for ChannelFeed {
    async fn subscribe(&self, _space_id: Uuid) -> PortResult<BoxStream<'static, FeedEvent>> {
        self.receiver
            .lock()
            .unwrap()
            .take()
            .map(|rx| rx.boxed())
            .ok_or_else(|| PortError::Unexpected("already subscribed".into()))
    }
}

pub struct RefusingFeed;

#[async_trait]
impl ChangeFeed for RefusingFeed {
    async fn subscribe(&self, _space_id: Uuid) -> PortResult<BoxStream<'static, FeedEvent>> {
        Err(PortError::Network("connection refused".into()))
    }
}

// --- Fixtures ---

pub fn space(user_id: &str) -> LearningSpace {
    LearningSpace {
        id: Uuid::new_v4(),
        user_id: user_id.into(),
        topic: "Photosynthesis".into(),
        language: Language::English,
        pdf_source: None,
        audio_source: None,
        summary_notes: None,
        flashcards: None,
        quiz: None,
        recommendations: None,
        audio_overview: None,
        audio_script: None,
        mindmap: None,
        version: 0,
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub struct Harness {
    pub repository: Arc<InMemoryRepository>,
    pub agent: Arc<FakeAgent>,
    pub storage: Arc<FakeStorage>,
    pub gateway: Arc<RemoteActionGateway>,
}

impl Harness {
    pub fn new(agent: impl FnOnce(Arc<InMemoryRepository>) -> FakeAgent) -> Self {
        let repository = Arc::new(InMemoryRepository::default());
        let agent = Arc::new(agent(repository.clone()));
        let storage = Arc::new(FakeStorage::default());
        let gateway = Arc::new(RemoteActionGateway::new(
            repository.clone(),
            agent.clone(),
            storage.clone(),
            UploadPolicy::default(),
        ));
        Self {
            repository,
            agent,
            storage,
            gateway,
        }
    }
}
