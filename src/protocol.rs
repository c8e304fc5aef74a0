//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::certificate::IssuedCertificate;
use crate::domain::{Course, Difficulty, PassThreshold, Quiz, TimerMode};
use crate::progress::{Badge, CertificateRecord, ProgressRecord};
use crate::runner::{RunnerEvent, SubmitReply};
use crate::session::SessionView;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartQuiz {
        #[serde(rename = "quizId")]
        quiz_id: String,
    },
    Retake,
    GetSession,
    Select {
        option: usize,
    },
    Submit,
    Previous,
    DismissExplanation,
    Abandon,
    IssueCertificate {
        #[serde(default)]
        name: Option<String>,
    },
    CancelCertificate,
    GetProgress,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: Option<SessionView>,
    },
    Submitted {
        reply: SubmitReply,
    },
    /// Countdown ticks, timeouts and completion pushed by the runner.
    Quiz {
        event: RunnerEvent,
    },
    Abandoned {
        had_session: bool,
    },
    Certificate {
        certificate: IssuedCertificate,
    },
    CertificateCancelled,
    Progress {
        progress: ProgressOut,
    },
    Error {
        message: String,
    },
}

/// Catalog listing entry; questions are not included.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub questions: usize,
    pub max_score: u32,
    pub timer: TimerMode,
    pub pass: PassThreshold,
    pub xp_reward: u32,
    pub completed: bool,
}

pub fn to_summary(q: &Quiz, completed: bool) -> QuizSummary {
    QuizSummary {
        id: q.id.clone(),
        title: q.title.clone(),
        description: q.description.clone(),
        category: q.category.clone(),
        difficulty: q.difficulty,
        questions: q.questions.len(),
        max_score: q.max_score(),
        timer: q.timer,
        pass: q.pass,
        xp_reward: q.xp_reward,
        completed,
    }
}

#[derive(Debug, Serialize)]
pub struct CourseOut {
    #[serde(flatten)]
    pub course: Course,
    pub quizzes: Vec<QuizSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressOut {
    #[serde(flatten)]
    pub progress: ProgressRecord,
    pub badges: Vec<Badge>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateOut {
    #[serde(flatten)]
    pub record: CertificateRecord,
    pub confirmed: Option<bool>,
    pub explorer_url: Option<String>,
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct StartIn {
    #[serde(rename = "quizId")]
    pub quiz_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectIn {
    pub option: usize,
}

#[derive(Debug, Deserialize, Default)]
pub struct CertificateIn {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileIn {
    pub username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileOut {
    pub username: String,
    pub wallet_address: Option<String>,
    pub network: String,
}

#[derive(Serialize)]
pub struct AbandonOut {
    pub had_session: bool,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}
