//! Arbitration between local filtering and backend searches

use super::CollectionController;
use crate::core::clauses::{ConcatOp, SearchClauses, combine_clauses};
use crate::core::error::{ConfigError, EngineError};
use crate::core::fields::{ApiEntity, FieldsSpec};
use crate::pipes::{match_words, starts_with_punctuation};
use anyhow::Result;

/// Where a typed text is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// The loaded rows already hold every match; filter them in memory
    Local,
    /// A new search must be sent
    Backend,
    /// Nothing to do
    None,
}

impl CollectionController {
    /// Decide how a typed text is resolved
    ///
    /// A backend search is required when a new word starts, or when the
    /// previous search did not load the whole result. While the text only
    /// extends the last sent word over a completed result, the loaded rows
    /// are filtered locally. Text typed while rows are loading is filtered
    /// locally until the load ends.
    pub fn pipe_to_backend_required(&self, text: &str) -> FilterDecision {
        let pipe_to_backend = self
            .model()
            .list
            .filter
            .as_ref()
            .is_some_and(|filter| filter.pipe_to_backend);
        if !pipe_to_backend {
            return FilterDecision::None;
        }
        let completed = self.query.completed();

        self.with_state_mut(|s| {
            if s.loading {
                s.local_still_required = !text.trim().is_empty();
                return FilterDecision::Local;
            }
            let Some(current) = s.current_match.clone() else {
                if text.is_empty() {
                    return FilterDecision::None;
                }
                s.current_match = Some(text.to_string());
                return FilterDecision::Backend;
            };
            if current == text {
                return if s.local_still_required {
                    FilterDecision::Local
                } else {
                    FilterDecision::None
                };
            }

            let extends = text.starts_with(current.as_str());
            let buffer = text.strip_prefix(current.as_str()).unwrap_or(text);
            let words = match_words(buffer).len();
            if words > 0 {
                s.current_match = Some(text.to_string());
            }

            if (starts_with_punctuation(buffer) && words == 1) || words > 1 {
                s.local_still_required = false;
                FilterDecision::Backend
            } else if !current.is_empty() && extends && completed {
                s.local_still_required = true;
                FilterDecision::Local
            } else {
                s.local_still_required = false;
                FilterDecision::Backend
            }
        })
    }

    /// `LIKE` clauses of the typed text over the filter pipe fields
    ///
    /// With split words and an `AND` concatenation every word must match
    /// some field; otherwise any word on any field is enough.
    pub fn build_pipe_clauses(&self, text: &str) -> Result<Option<SearchClauses>> {
        let model = self.model();
        let Some(filter) = model.list.filter.as_ref().filter(|f| f.pipe_to_backend) else {
            return Ok(None);
        };
        if filter.pipe.is_empty() {
            return Err(EngineError::from(ConfigError::MissingFilterPipe {
                entity: model.name.plural.clone(),
            })
            .into());
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let pipe = FieldsSpec::List(
            filter
                .pipe
                .iter()
                .map(|field| FieldsSpec::Text(field.replace('?', "")))
                .collect(),
        );
        let parsed = ApiEntity::parse_fields(&model.backend.plural, Some(&pipe))?;
        let columns: Vec<String> = ApiEntity::join_fields(&parsed)
            .iter()
            .flat_map(|entity| {
                let table = entity.table.alias_or_name().to_string();
                entity
                    .columns
                    .iter()
                    .map(move |column| format!("{}.{}", table, column.name))
            })
            .collect();

        let like = |column: &String, word: &str| {
            SearchClauses::clause(column.clone(), "LIKE", format!("%{}%", word))
        };
        let clauses: Vec<SearchClauses> = if !filter.split_pipe_words {
            columns.iter().map(|column| like(column, text)).collect()
        } else {
            let words = match_words(text);
            match filter.concat_pipe_words {
                ConcatOp::Or => words
                    .iter()
                    .flat_map(|word| columns.iter().map(move |column| like(column, word)))
                    .collect(),
                ConcatOp::And => words
                    .iter()
                    .map(|word| {
                        let group = columns.iter().map(|column| like(column, word)).collect();
                        SearchClauses::or(group)
                    })
                    .collect(),
            }
        };

        if clauses.is_empty() {
            return Ok(None);
        }
        let op = if filter.split_pipe_words {
            filter.concat_pipe_words
        } else {
            ConcatOp::Or
        };
        Ok(Some(SearchClauses::group(op, clauses)))
    }

    /// Combine caller clauses with the clauses of the typed text
    pub fn combine_search_clauses(
        &self,
        clauses: Option<SearchClauses>,
    ) -> Result<Option<SearchClauses>> {
        let text = self.text();
        let pipe = self.build_pipe_clauses(&text)?;
        Ok(combine_clauses(clauses, pipe, self.model().search_op()))
    }

    pub fn text(&self) -> String {
        self.with_state(|s| s.text.clone())
    }

    /// Take a new search text, sending it to the backend when required
    ///
    /// Once a backend search returns, text typed during the load is
    /// arbitrated again against the new rows.
    pub async fn apply_filter(&self, text: &str) -> Result<FilterDecision> {
        self.with_state_mut(|s| s.text = text.to_string());
        let decision = self.resolve_text(text).await?;
        if decision == FilterDecision::Backend {
            let mut sent = text.to_string();
            loop {
                let pending = self.text();
                if pending == sent {
                    break;
                }
                self.resolve_text(&pending).await?;
                sent = pending;
            }
        }
        Ok(decision)
    }

    async fn resolve_text(&self, text: &str) -> Result<FilterDecision> {
        let decision = self.pipe_to_backend_required(text);
        tracing::debug!(key = %self.query.key(), text = %text, decision = ?decision, "search text");
        if decision != FilterDecision::Backend {
            return Ok(decision);
        }

        let form = self.parse_filter().await?;
        let pipe = self.build_pipe_clauses(text)?;
        let search = combine_clauses(pipe, form, self.model().search_op());
        self.with_state_mut(|s| {
            s.current_match = (!text.is_empty()).then(|| text.to_string());
        });
        self.reload_with(search).await?;
        Ok(decision)
    }

    /// Whether the typed text is applied to the loaded rows in memory
    pub fn is_local_filtered(&self) -> bool {
        let Some(filter) = self.model().list.filter.as_ref() else {
            return false;
        };
        self.with_state(|s| {
            !s.text.trim().is_empty() && (!filter.pipe_to_backend || s.local_still_required)
        })
    }
}
