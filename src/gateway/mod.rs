//! 入站事件分类与回复渲染
//!
//! 传输层把原始事件交给 `classify` 得到 `Intent`，再由 `dispatch` 调用服务层并生成 `Reply`。

use serde::{Deserialize, Serialize};

use crate::service::{ProximityService, ServiceError};

pub const NEW_COMMAND: &str = "/new";
pub const ALL_COMMAND: &str = "/all";

/// 传输层上报的原始事件
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
    pub user_id: UserId,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub location: Option<SharedLocation>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SharedLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// 用户ID，数字ID统一转为字符串
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl UserId {
    pub fn into_key(self) -> String {
        match self {
            UserId::Number(n) => n.to_string(),
            UserId::Text(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    SetLocation {
        user: String,
        latitude: f64,
        longitude: f64,
    },
    PostMessage {
        user: String,
        text: String,
    },
    QueryNearby {
        user: String,
    },
    /// `/new` 命令，只记录日志
    Ignored { user: String, text: String },
    Unrecognized { user: String },
}

/// 按命令、位置、文本的顺序分类
pub fn classify(event: InboundEvent) -> Intent {
    let user = event.user_id.into_key();
    let text = event.text.unwrap_or_default();

    if text == NEW_COMMAND {
        return Intent::Ignored { user, text };
    }
    if text == ALL_COMMAND {
        return Intent::QueryNearby { user };
    }
    if let Some(loc) = event.location {
        return Intent::SetLocation {
            user,
            latitude: loc.latitude,
            longitude: loc.longitude,
        };
    }
    if !text.is_empty() {
        return Intent::PostMessage { user, text };
    }
    Intent::Unrecognized { user }
}

/// 每条回复附带的快捷操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickAction {
    New,
    All,
    Position,
}

impl QuickAction {
    pub const STANDING: [QuickAction; 3] = [QuickAction::New, QuickAction::All, QuickAction::Position];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Ok,
    Guidance,
    Invalid,
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub kind: ReplyKind,
    pub texts: Vec<String>,
    pub actions: Vec<QuickAction>,
}

impl Reply {
    fn new(kind: ReplyKind, texts: Vec<String>) -> Self {
        Self {
            kind,
            texts,
            actions: QuickAction::STANDING.to_vec(),
        }
    }

    pub fn ok(text: impl Into<String>) -> Self {
        Self::new(ReplyKind::Ok, vec![text.into()])
    }

    pub fn from_error(err: &ServiceError) -> Self {
        let kind = match err {
            ServiceError::LocationRequired(_) => ReplyKind::Guidance,
            ServiceError::Store(_) => ReplyKind::Failure,
            _ => ReplyKind::Invalid,
        };
        Self::new(kind, vec![err.user_message()])
    }
}

pub async fn dispatch(service: &ProximityService, intent: Intent) -> Reply {
    let result = match intent {
        Intent::SetLocation {
            user,
            latitude,
            longitude,
        } => service
            .set_location(&user, latitude, longitude)
            .await
            .map(|_| Reply::ok("Position set")),
        Intent::PostMessage { user, text } => service
            .post_message(&user, &text)
            .await
            .map(|_| Reply::ok("ok")),
        Intent::QueryNearby { user } => service.query_nearby(&user).await.map(|messages| {
            // 空结果也是正常回复，不附带文本
            Reply::new(
                ReplyKind::Ok,
                messages.into_iter().map(|m| m.line).collect(),
            )
        }),
        Intent::Ignored { user, text } => {
            tracing::info!("Ignored command {} from {}", text, user);
            Ok(Reply::new(ReplyKind::Ok, Vec::new()))
        }
        Intent::Unrecognized { user } => {
            tracing::debug!("Unrecognized event from {}", user);
            Ok(Reply::new(
                ReplyKind::Invalid,
                vec!["Send a text, /all, or share your position".to_string()],
            ))
        }
    };

    result.unwrap_or_else(|e| Reply::from_error(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::MemoryStore;

    fn event(text: Option<&str>, location: Option<(f64, f64)>) -> InboundEvent {
        InboundEvent {
            user_id: UserId::Number(7),
            text: text.map(str::to_string),
            location: location.map(|(latitude, longitude)| SharedLocation {
                latitude,
                longitude,
            }),
        }
    }

    #[test]
    fn classifies_reserved_commands() {
        assert_eq!(
            classify(event(Some("/all"), None)),
            Intent::QueryNearby { user: "7".into() }
        );
        assert_eq!(
            classify(event(Some("/new"), None)),
            Intent::Ignored {
                user: "7".into(),
                text: "/new".into()
            }
        );
    }

    #[test]
    fn location_takes_precedence_over_text() {
        assert_eq!(
            classify(event(Some("caption"), Some((1.0, 2.0)))),
            Intent::SetLocation {
                user: "7".into(),
                latitude: 1.0,
                longitude: 2.0
            }
        );
    }

    #[test]
    fn plain_text_is_a_post_and_empty_event_is_unrecognized() {
        assert_eq!(
            classify(event(Some("hello"), None)),
            Intent::PostMessage {
                user: "7".into(),
                text: "hello".into()
            }
        );
        assert_eq!(
            classify(event(None, None)),
            Intent::Unrecognized { user: "7".into() }
        );
    }

    #[test]
    fn user_id_accepts_numbers_and_strings() {
        let a: InboundEvent = serde_json::from_str(r#"{"user_id": 12, "text": "x"}"#).unwrap();
        let b: InboundEvent = serde_json::from_str(r#"{"user_id": "alice"}"#).unwrap();
        assert_eq!(a.user_id.into_key(), "12");
        assert_eq!(b.user_id.into_key(), "alice");
    }

    #[tokio::test]
    async fn dispatch_renders_replies_with_actions() {
        let svc = ProximityService::new(Arc::new(MemoryStore::new()));

        let reply = dispatch(&svc, classify(event(Some("hi"), None))).await;
        assert_eq!(reply.kind, ReplyKind::Guidance);
        assert_eq!(reply.texts, vec!["Set position first"]);
        assert_eq!(reply.actions, QuickAction::STANDING.to_vec());

        let reply = dispatch(&svc, classify(event(None, Some((52.52, 13.405))))).await;
        assert_eq!(reply.texts, vec!["Position set"]);

        let reply = dispatch(&svc, classify(event(Some("hi"), None))).await;
        assert_eq!(reply.texts, vec!["ok"]);

        let reply = dispatch(&svc, classify(event(Some("/all"), None))).await;
        assert_eq!(reply.kind, ReplyKind::Ok);
        assert_eq!(reply.texts.len(), 1);
        assert!(reply.texts[0].ends_with("] hi"));

        let reply = dispatch(&svc, classify(event(Some("/new"), None))).await;
        assert!(reply.texts.is_empty());
    }
}
