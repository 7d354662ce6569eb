use std::collections::HashSet;
use std::time::Duration;

use super::error::MigrationResult;
use super::media::{log_would_upload, MediaUploader};
use super::report::FailedRecord;
use crate::mapping::{Mapping, MappingStore};
use crate::source::{CategoryRecord, MediaKind};
use crate::target::{category_payload, TargetClient, TargetError};

/// Where a pending record stands against the current mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The mapping already holds a live target for this record
    AlreadyMapped,
    /// The parent is known; the record can be created below `parent_target_id`
    Ready {
        /// Target id to attach the record to
        parent_target_id: String,
    },
    /// The parent has no (live) target yet
    AwaitingParent,
}

/// Decides what to do with `record`. Pure: no I/O, no mutation.
///
/// `stale` holds legacy ids whose mapped target was found deleted; such entries count as
/// unresolved for the record itself and for its children.
#[must_use]
pub fn classify(
    record: &CategoryRecord,
    mapping: &Mapping,
    stale: &HashSet<String>,
    root_target_id: &str,
) -> Resolution {
    if mapping.contains(&record.id) && !stale.contains(&record.id) {
        return Resolution::AlreadyMapped;
    }

    match &record.parent_id {
        None => Resolution::Ready {
            parent_target_id: root_target_id.to_string(),
        },
        Some(parent_id) if stale.contains(parent_id) => Resolution::AwaitingParent,
        Some(parent_id) => mapping
            .get(parent_id)
            .map_or(Resolution::AwaitingParent, |target_id| Resolution::Ready {
                parent_target_id: target_id.to_string(),
            }),
    }
}

/// Which pending records a pass may create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassScope {
    /// Only records without a parent
    RootsOnly,
    /// Every record whose parent is resolved
    All,
}

/// Creates categories in the target. The engine switches implementations for dry runs.
#[async_trait::async_trait]
pub trait CategoryWriter: Send + Sync {
    /// Creates `record` below `parent_target_id` and returns the new target id.
    async fn create(
        &self,
        record: &CategoryRecord,
        parent_target_id: &str,
    ) -> Result<String, TargetError>;
}

/// Creates categories through the target API, uploading the thumbnail first.
pub(super) struct ApiCategoryWriter<'a> {
    pub target: &'a TargetClient,
    pub media: &'a MediaUploader<'a>,
}

#[async_trait::async_trait]
impl CategoryWriter for ApiCategoryWriter<'_> {
    async fn create(
        &self,
        record: &CategoryRecord,
        parent_target_id: &str,
    ) -> Result<String, TargetError> {
        let media_id = match &record.thumbnail {
            Some(thumbnail) => {
                self.media
                    .upload(&record.id, MediaKind::CategoryThumbnail, thumbnail)
                    .await?
            }
            None => None,
        };
        self.target
            .create_category(category_payload(
                record,
                parent_target_id,
                media_id.as_deref(),
            ))
            .await
    }
}

/// Pretends to create categories, handing out `dry-run:<id>` placeholders.
pub struct DryRunWriter;

/// Prefix of the placeholder target ids a dry run hands out.
pub const DRY_RUN_PREFIX: &str = "dry-run:";

#[async_trait::async_trait]
impl CategoryWriter for DryRunWriter {
    async fn create(
        &self,
        record: &CategoryRecord,
        parent_target_id: &str,
    ) -> Result<String, TargetError> {
        crate::info!(
            "category.would_create id={} name={:?} parent_target_id={}",
            record.id,
            record.name,
            parent_target_id
        );
        if let Some(thumbnail) = &record.thumbnail {
            log_would_upload(&record.id, MediaKind::CategoryThumbnail, thumbnail);
        }
        Ok(format!("{DRY_RUN_PREFIX}{}", record.id))
    }
}

/// Everything a pass needs besides its state.
pub struct PassContext<'a> {
    /// Performs the creates
    pub writer: &'a dyn CategoryWriter,
    /// Target id the top-level records hang below
    pub root_target_id: &'a str,
    /// Saves the mapping after each create when set
    pub checkpoint: Option<&'a MappingStore>,
    /// Pause after each create call
    pub request_delay: Duration,
}

/// The values a pass consumes and produces.
#[derive(Debug, Clone, Default)]
pub struct PassState {
    /// Records not yet resolved, in source order
    pub pending: Vec<CategoryRecord>,
    /// The live mapping
    pub mapping: Mapping,
    /// Legacy ids whose mapped target no longer exists
    pub stale: HashSet<String>,
}

/// What happened during one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Legacy ids created, in creation order
    pub created: Vec<String>,
    /// Legacy ids whose create failed but may succeed later; still pending
    pub retryable: Vec<String>,
    /// Records given up on; removed from pending
    pub abandoned: Vec<FailedRecord>,
}

impl PassOutcome {
    /// A pass that created nothing and has nothing to retry cannot be followed by a more
    /// productive one.
    #[must_use]
    pub fn is_fixed_point(&self) -> bool {
        self.created.is_empty() && self.retryable.is_empty()
    }
}

/// Runs one pass over the pending records in source order.
///
/// The mapping is updated as records are created, so a chain listed parent-first can
/// complete within a single pass. Only authentication failures abort the pass; every other
/// create failure is recorded in the outcome.
///
/// # Errors
/// - `MigrationError::Target` with `AuthenticationFailed` if the API stops accepting us
/// - `MigrationError::Mapping` if a checkpoint cannot be written
pub async fn run_pass(
    state: PassState,
    scope: PassScope,
    ctx: &PassContext<'_>,
) -> MigrationResult<(PassState, PassOutcome)> {
    let PassState {
        pending,
        mut mapping,
        mut stale,
    } = state;
    let mut still_pending = Vec::with_capacity(pending.len());
    let mut outcome = PassOutcome::default();

    for record in pending {
        if scope == PassScope::RootsOnly && !record.is_root() {
            still_pending.push(record);
            continue;
        }

        let parent_target_id =
            match classify(&record, &mapping, &stale, ctx.root_target_id) {
                Resolution::AlreadyMapped => continue,
                Resolution::AwaitingParent => {
                    still_pending.push(record);
                    continue;
                }
                Resolution::Ready { parent_target_id } => parent_target_id,
            };

        let result = ctx.writer.create(&record, &parent_target_id).await;
        if !ctx.request_delay.is_zero() {
            tokio::time::sleep(ctx.request_delay).await;
        }

        match result {
            Ok(target_id) => {
                crate::info!(
                    "category.created id={} target_id={} parent_target_id={}",
                    record.id,
                    target_id,
                    parent_target_id
                );
                stale.remove(&record.id);
                mapping.insert(record.id.clone(), target_id);
                outcome.created.push(record.id);
                if let Some(store) = ctx.checkpoint {
                    store.save(&mapping)?;
                }
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) if e.is_retryable() => {
                crate::warn!(
                    "category.create_failed id={} retryable=true error={}",
                    record.id,
                    e
                );
                outcome.retryable.push(record.id.clone());
                still_pending.push(record);
            }
            Err(e) => {
                crate::error!(
                    "category.create_failed id={} retryable=false error={}",
                    record.id,
                    e
                );
                outcome.abandoned.push(FailedRecord {
                    id: record.id,
                    cause: e.to_string(),
                });
            }
        }
    }

    Ok((
        PassState {
            pending: still_pending,
            mapping,
            stale,
        },
        outcome,
    ))
}

/// Pending records whose parent never resolved, in source order.
#[must_use]
pub fn find_orphans(state: &PassState) -> Vec<CategoryRecord> {
    state
        .pending
        .iter()
        .filter(|record| {
            record.parent_id.as_ref().is_some_and(|parent_id| {
                !state.mapping.contains(parent_id) || state.stale.contains(parent_id)
            })
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::category_row;
    use std::sync::Mutex;

    fn record(id: &str, parent: Option<&str>) -> CategoryRecord {
        CategoryRecord::from_row(category_row(id, parent), &[]).unwrap()
    }

    /// Hands out `t-<id>` and fails the ids it was told to.
    #[derive(Default)]
    struct ScriptedWriter {
        retryable: Vec<&'static str>,
        broken: Vec<&'static str>,
        unauthorized: Vec<&'static str>,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl CategoryWriter for ScriptedWriter {
        async fn create(
            &self,
            record: &CategoryRecord,
            parent_target_id: &str,
        ) -> Result<String, TargetError> {
            self.calls
                .lock()
                .unwrap()
                .push((record.id.clone(), parent_target_id.to_string()));
            let id = record.id.as_str();
            let listed = |list: &Vec<&'static str>| list.iter().any(|entry| *entry == id);
            if listed(&self.unauthorized) {
                return Err(TargetError::AuthenticationFailed {
                    reason: "401".to_string(),
                });
            }
            if listed(&self.retryable) || listed(&self.broken) {
                return Err(TargetError::CreateFailed {
                    entity: "category".to_string(),
                    cause: "scripted".to_string(),
                    retryable: listed(&self.retryable),
                });
            }
            Ok(format!("t-{id}"))
        }
    }

    fn ctx(writer: &ScriptedWriter) -> PassContext<'_> {
        PassContext {
            writer,
            root_target_id: "root",
            checkpoint: None,
            request_delay: Duration::ZERO,
        }
    }

    fn state(records: Vec<CategoryRecord>) -> PassState {
        PassState {
            pending: records,
            ..PassState::default()
        }
    }

    #[test]
    fn test_classify() {
        let mapping: Mapping = [("a", "t-a"), ("s", "t-s")].into_iter().collect();
        let stale: HashSet<String> = ["s".to_string()].into_iter().collect();

        assert_eq!(
            classify(&record("a", None), &mapping, &stale, "root"),
            Resolution::AlreadyMapped
        );
        assert_eq!(
            classify(&record("r", None), &mapping, &stale, "root"),
            Resolution::Ready {
                parent_target_id: "root".to_string()
            }
        );
        assert_eq!(
            classify(&record("b", Some("a")), &mapping, &stale, "root"),
            Resolution::Ready {
                parent_target_id: "t-a".to_string()
            }
        );
        assert_eq!(
            classify(&record("c", Some("missing")), &mapping, &stale, "root"),
            Resolution::AwaitingParent
        );
        // a stale record is created again, its children wait for it
        assert_eq!(
            classify(&record("s", None), &mapping, &stale, "root"),
            Resolution::Ready {
                parent_target_id: "root".to_string()
            }
        );
        assert_eq!(
            classify(&record("d", Some("s")), &mapping, &stale, "root"),
            Resolution::AwaitingParent
        );
    }

    #[tokio::test]
    async fn test_chain_in_source_order_completes_in_one_pass() {
        let writer = ScriptedWriter::default();
        let (state, outcome) = run_pass(
            state(vec![
                record("a", None),
                record("b", Some("a")),
                record("c", Some("b")),
            ]),
            PassScope::All,
            &ctx(&writer),
        )
        .await
        .unwrap();

        assert!(state.pending.is_empty());
        assert_eq!(outcome.created, vec!["a", "b", "c"]);
        assert_eq!(
            *writer.calls.lock().unwrap(),
            vec![
                ("a".to_string(), "root".to_string()),
                ("b".to_string(), "t-a".to_string()),
                ("c".to_string(), "t-b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_roots_only_scope_leaves_children_pending() {
        let writer = ScriptedWriter::default();
        let (state, outcome) = run_pass(
            state(vec![record("b", Some("a")), record("a", None)]),
            PassScope::RootsOnly,
            &ctx(&writer),
        )
        .await
        .unwrap();

        assert_eq!(outcome.created, vec!["a"]);
        assert_eq!(state.pending.len(), 1);
        assert_eq!(state.pending[0].id, "b");
    }

    #[tokio::test]
    async fn test_failures_are_sorted_by_retryability() {
        let writer = ScriptedWriter {
            retryable: vec!["b"],
            broken: vec!["c"],
            ..ScriptedWriter::default()
        };
        let (state, outcome) = run_pass(
            state(vec![
                record("a", None),
                record("b", Some("a")),
                record("c", Some("a")),
                record("d", Some("c")),
            ]),
            PassScope::All,
            &ctx(&writer),
        )
        .await
        .unwrap();

        assert_eq!(outcome.created, vec!["a"]);
        assert_eq!(outcome.retryable, vec!["b"]);
        assert_eq!(outcome.abandoned.len(), 1);
        assert_eq!(outcome.abandoned[0].id, "c");
        assert!(!outcome.is_fixed_point());

        let pending: Vec<&str> = state.pending.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(pending, vec!["b", "d"]);
        assert_eq!(find_orphans(&state).len(), 1);
        assert_eq!(find_orphans(&state)[0].id, "d");
    }

    #[tokio::test]
    async fn test_authentication_failure_aborts_pass() {
        let writer = ScriptedWriter {
            unauthorized: vec!["b"],
            ..ScriptedWriter::default()
        };
        let result = run_pass(
            state(vec![record("a", None), record("b", None), record("c", None)]),
            PassScope::All,
            &ctx(&writer),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(writer.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_writer_placeholders() {
        let (state, _) = run_pass(
            state(vec![record("a", None), record("b", Some("a"))]),
            PassScope::All,
            &PassContext {
                writer: &DryRunWriter,
                root_target_id: "root",
                checkpoint: None,
                request_delay: Duration::ZERO,
            },
        )
        .await
        .unwrap();

        assert_eq!(state.mapping.get("a"), Some("dry-run:a"));
        assert_eq!(state.mapping.get("b"), Some("dry-run:b"));
    }

    #[tokio::test]
    async fn test_cycle_makes_no_progress() {
        let writer = ScriptedWriter::default();
        let (state, outcome) = run_pass(
            state(vec![record("p", Some("q")), record("q", Some("p"))]),
            PassScope::All,
            &ctx(&writer),
        )
        .await
        .unwrap();

        assert!(outcome.is_fixed_point());
        assert_eq!(find_orphans(&state).len(), 2);
        assert!(writer.calls.lock().unwrap().is_empty());
    }
}
