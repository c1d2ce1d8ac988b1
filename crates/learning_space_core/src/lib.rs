pub mod controller;
pub mod domain;
pub mod gateway;
pub mod merge;
pub mod ports;
pub mod quiz;
pub mod realtime;
pub mod session;
pub mod timer;
pub mod widget;

pub use controller::{EventReceiver, SpaceController};
pub use domain::{
    Content, ContentKind, Flashcard, Language, LearningSpace, NewLearningSpace, ProfileUpdate,
    Question, QuestionOptions, QuizData, Recommendation, SpaceUpdate, StudentProfile,
    SummaryNotes,
};
pub use gateway::{ActionResult, RemoteActionGateway, SourceFile, UploadPolicy};
pub use ports::{
    AgentReply, AgentWorkflowService, ChangeFeed, LearningSpaceRepository, ObjectStorage,
    PortError, PortResult, StoredObject, WorkflowRequest,
};
pub use quiz::{AnswerKey, QuizSession, QuizView};
pub use realtime::{ConnectionState, ConnectionStatus, FeedEvent, RealtimeDelta, RealtimeSubscription};
pub use session::{LearningSpaceSession, Notice, NoticeLevel, SessionEvent};
pub use timer::{GenerationStatus, GenerationTimer};
pub use widget::{ContentWidget, GenerationOutcome, WidgetPhase};
