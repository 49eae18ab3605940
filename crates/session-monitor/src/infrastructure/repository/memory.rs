//! Process-local stand-in for a redis server, used when the backend is
//! configured in mock mode and by tests.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use error_stack::Report;

use super::types::CacheObject;
use super::types::RepositoryError;
use super::KvBackend;

/// A command as the in-memory backend received it.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Time,
    Ping,
    XAdd {
        stream: String,
        fields: Vec<(String, String)>,
    },
    Set {
        key: String,
        value: String,
        expiration: Option<Duration>,
    },
    SAdd {
        key: String,
        members: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: Vec<(String, String)>,
}

impl StreamEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct MemoryState {
    strings: HashMap<String, (String, Option<Instant>)>,
    sets: HashMap<String, BTreeSet<String>>,
    streams: HashMap<String, Vec<StreamEntry>>,
    last_stream_id: (u64, u64),
    commands: Vec<Command>,
}

impl MemoryState {
    fn next_stream_id(&mut self) -> String {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let (last_millis, last_seq) = self.last_stream_id;
        self.last_stream_id = if millis > last_millis {
            (millis, 0)
        } else {
            (last_millis, last_seq + 1)
        };
        format!("{}-{}", self.last_stream_id.0, self.last_stream_id.1)
    }
}

pub struct InMemoryBackend {
    name: String,
    state: Mutex<MemoryState>,
    failing: AtomicBool,
}

impl InMemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MemoryState::default()),
            failing: AtomicBool::new(false),
        }
    }

    /// When enabled every command fails, which lets tests exercise error paths.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let state = self.lock();
        state
            .strings
            .get(key)
            .filter(|(_, deadline)| deadline.map_or(true, |d| d > Instant::now()))
            .map(|(value, _)| value.clone())
    }

    pub fn members(&self, set_key: &str) -> BTreeSet<String> {
        self.lock().sets.get(set_key).cloned().unwrap_or_default()
    }

    pub fn stream(&self, stream_key: &str) -> Vec<StreamEntry> {
        self.lock()
            .streams
            .get(stream_key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, command: &str) -> Result<(), Report<RepositoryError>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Report::new(RepositoryError::CommandFailed {
                backend: self.name.clone(),
                command: command.to_string(),
            })
            .attach_printable("in-memory backend is in failing mode"));
        }
        Ok(())
    }
}

#[async_trait]
impl KvBackend for InMemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn server_timestamp(&self) -> Result<i64, Report<RepositoryError>> {
        self.check("TIME")?;
        self.lock().commands.push(Command::Time);
        Ok(Utc::now().timestamp())
    }

    async fn ping(&self) -> Result<String, Report<RepositoryError>> {
        self.check("PING")?;
        self.lock().commands.push(Command::Ping);
        Ok("PONG".to_string())
    }

    async fn add_stream_event(
        &self,
        stream_key: &str,
        id: &str,
        fields: &[(String, String)],
    ) -> Result<String, Report<RepositoryError>> {
        self.check("XADD")?;
        let mut state = self.lock();
        let id = if id == "*" {
            state.next_stream_id()
        } else {
            id.to_string()
        };
        state.commands.push(Command::XAdd {
            stream: stream_key.to_string(),
            fields: fields.to_vec(),
        });
        state
            .streams
            .entry(stream_key.to_string())
            .or_default()
            .push(StreamEntry {
                id: id.clone(),
                fields: fields.to_vec(),
            });
        Ok(id)
    }

    async fn add_to_unsorted_set(
        &self,
        set_key: &str,
        objects: &[CacheObject],
    ) -> Result<u64, Report<RepositoryError>> {
        self.check("MULTI SET SADD")?;
        if objects.is_empty() {
            return Ok(0);
        }

        let mut state = self.lock();
        for object in objects {
            let deadline = object.expiration.map(|ttl| Instant::now() + ttl);
            state
                .strings
                .insert(object.key.clone(), (object.payload.clone(), deadline));
            state.commands.push(Command::Set {
                key: object.key.clone(),
                value: object.payload.clone(),
                expiration: object.expiration,
            });
        }

        let members: Vec<String> = objects.iter().map(|o| o.key.clone()).collect();
        state.commands.push(Command::SAdd {
            key: set_key.to_string(),
            members: members.clone(),
        });
        let set = state.sets.entry(set_key.to_string()).or_default();
        let added = members
            .into_iter()
            .filter(|member| set.insert(member.clone()))
            .count();
        Ok(added as u64)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;

    #[test(tokio::test)]
    async fn unsorted_set_write_sets_key_and_index() {
        let backend = InMemoryBackend::new("mock");

        let added = backend
            .add_to_unsorted_set("gpu-pools", &[CacheObject::new("viz1", "payload")])
            .await
            .expect("write should succeed");

        assert_eq!(added, 1);
        assert_eq!(
            backend.commands(),
            vec![
                Command::Set {
                    key: "viz1".to_string(),
                    value: "payload".to_string(),
                    expiration: None,
                },
                Command::SAdd {
                    key: "gpu-pools".to_string(),
                    members: vec!["viz1".to_string()],
                },
            ]
        );
        assert_eq!(backend.get("viz1").as_deref(), Some("payload"));
    }

    #[test(tokio::test)]
    async fn re_adding_a_member_counts_zero() {
        let backend = InMemoryBackend::new("mock");
        let object = CacheObject::new("viz1", "v1");

        backend
            .add_to_unsorted_set("gpu-pools", &[object.clone()])
            .await
            .unwrap();
        let added = backend
            .add_to_unsorted_set("gpu-pools", &[CacheObject::new("viz1", "v2")])
            .await
            .unwrap();

        assert_eq!(added, 0);
        assert_eq!(backend.get("viz1").as_deref(), Some("v2"));
        assert_eq!(backend.members("gpu-pools").len(), 1);
    }

    #[test(tokio::test)]
    async fn expired_keys_are_not_returned() {
        let backend = InMemoryBackend::new("mock");
        let object = CacheObject::new("short", "v").with_expiration(Duration::from_millis(10));

        backend
            .add_to_unsorted_set("set", &[object])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(backend.get("short"), None);
        assert!(backend.members("set").contains("short"));
    }

    #[test(tokio::test)]
    async fn stream_ids_are_increasing() {
        let backend = InMemoryBackend::new("mock");
        let fields = vec![("TaskType".to_string(), "EnqueueSession".to_string())];

        let first = backend.add_stream_event("s", "*", &fields).await.unwrap();
        let second = backend.add_stream_event("s", "*", &fields).await.unwrap();

        let parse = |id: &str| -> (u64, u64) {
            let (ms, seq) = id.split_once('-').unwrap();
            (ms.parse().unwrap(), seq.parse().unwrap())
        };
        assert!(parse(&second) > parse(&first));
        assert_eq!(backend.stream("s").len(), 2);
        assert_eq!(backend.stream("s")[0].field("TaskType"), Some("EnqueueSession"));
    }

    #[test(tokio::test)]
    async fn failing_mode_rejects_commands() {
        let backend = InMemoryBackend::new("mock");
        backend.set_failing(true);

        let err = backend.ping().await.expect_err("ping should fail");
        assert!(matches!(
            err.current_context(),
            RepositoryError::CommandFailed { command, .. } if command == "PING"
        ));
        assert!(backend.commands().is_empty());
    }
}
