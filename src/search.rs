//! Interactive search session.
//!
//! The session alternates between typing a query and viewing one class:
//!
//! ```text
//! Searching { prefill } --select n--> Viewing { class_name, query }
//!        ^                                   |
//!        +----------- escape (prefill = query)
//! ```
//!
//! It only holds UI state; every lookup goes straight to the [`IndexStore`].

use std::collections::BTreeSet;

use crate::error::Result;
use crate::store::{ClassRecord, IndexStore};

pub const DEFAULT_MATCH_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchState {
    Searching { prefill: String },
    Viewing { class_name: String, query: String },
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    /// 1-based position in the last match list.
    Select(usize),
    Escape,
    Quit,
}

impl Input {
    /// Maps a raw prompt line to an input for the current state. An empty line
    /// re-runs the previous query while searching and goes back while viewing.
    pub fn parse(line: &str, state: &SearchState) -> Self {
        let line = line.trim();
        if line == ":q" || line == ":quit" {
            return Input::Quit;
        }
        match state {
            SearchState::Viewing { .. } if line.is_empty() || line == ":b" => Input::Escape,
            SearchState::Searching { prefill } if line.is_empty() => {
                if prefill.is_empty() {
                    Input::Escape
                } else {
                    Input::Text(prefill.clone())
                }
            }
            _ => match line.parse::<usize>() {
                Ok(n) if n > 0 => Input::Select(n),
                _ => Input::Text(line.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Prompt,
    Matches {
        query: String,
        classes: Vec<String>,
        truncated: bool,
    },
    Detail {
        class_name: String,
        records: Vec<ClassRecord>,
    },
    Message(String),
    Exit,
}

pub struct SearchSession<'a> {
    store: &'a IndexStore,
    state: SearchState,
    matches: Vec<String>,
    limit: usize,
}

impl<'a> SearchSession<'a> {
    pub fn new(store: &'a IndexStore) -> Self {
        Self {
            store,
            state: SearchState::Searching {
                prefill: String::new(),
            },
            matches: Vec::new(),
            limit: DEFAULT_MATCH_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn handle(&mut self, input: Input) -> Result<View> {
        let state = std::mem::replace(&mut self.state, SearchState::Done);
        let (next, view) = match (state, input) {
            (_, Input::Quit) | (SearchState::Done, _) => (SearchState::Done, View::Exit),
            (SearchState::Viewing { query, .. }, Input::Escape) => {
                (SearchState::Searching { prefill: query }, View::Prompt)
            }
            (state @ SearchState::Searching { .. }, Input::Escape) => (state, View::Prompt),
            (state, Input::Text(query)) => {
                if query.trim().is_empty() {
                    (state, View::Prompt)
                } else {
                    let view = self.run_query(query.trim())?;
                    (
                        SearchState::Searching {
                            prefill: query.trim().to_string(),
                        },
                        view,
                    )
                }
            }
            (state, Input::Select(n)) => match n.checked_sub(1).and_then(|i| self.matches.get(i)).cloned() {
                Some(class_name) => {
                    let query = match state {
                        SearchState::Searching { prefill } => prefill,
                        SearchState::Viewing { query, .. } => query,
                        SearchState::Done => String::new(),
                    };
                    let records = self.store.records_for_class(&class_name)?;
                    (
                        SearchState::Viewing {
                            class_name: class_name.clone(),
                            query,
                        },
                        View::Detail {
                            class_name,
                            records,
                        },
                    )
                }
                None => (state, View::Message(format!("no match #{n}"))),
            },
        };
        self.state = next;
        Ok(view)
    }

    fn run_query(&mut self, query: &str) -> Result<View> {
        let hits = self.store.query_substring(query)?;
        let distinct: BTreeSet<String> = hits.into_iter().map(|h| h.class_name).collect();
        let truncated = distinct.len() > self.limit;
        self.matches = distinct.into_iter().take(self.limit).collect();
        Ok(View::Matches {
            query: query.to_string(),
            classes: self.matches.clone(),
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::testutil::{remove_db, temp_db_path};

    fn seeded_store(name: &str) -> anyhow::Result<(IndexStore, std::path::PathBuf)> {
        let db_path = temp_db_path(name);
        let store = IndexStore::open(db_path.clone())?;
        let mut update = store.begin_archive_update(
            "/r/app.war",
            Fingerprint {
                modified_nanos: 1,
                size: 1,
                sha256: None,
            },
        );
        update.add_class("com.foo.BarBaz", "app.war->WEB-INF/lib/a.jar");
        update.add_class("com.foo.BarBaz", "app.war->WEB-INF/lib/b.jar");
        update.add_class("com.foo.Other", "app.war");
        store.commit(update)?;
        Ok((store, db_path))
    }

    #[test]
    fn parse_depends_on_state() {
        let searching = SearchState::Searching {
            prefill: "bar".to_string(),
        };
        let viewing = SearchState::Viewing {
            class_name: "a.B".to_string(),
            query: "b".to_string(),
        };
        assert_eq!(Input::parse("", &searching), Input::Text("bar".to_string()));
        assert_eq!(Input::parse("  2 ", &searching), Input::Select(2));
        assert_eq!(Input::parse("0", &searching), Input::Text("0".to_string()));
        assert_eq!(Input::parse("", &viewing), Input::Escape);
        assert_eq!(Input::parse("baz", &viewing), Input::Text("baz".to_string()));
        assert_eq!(Input::parse(":q", &viewing), Input::Quit);
    }

    #[test]
    fn select_then_escape_keeps_previous_query() -> anyhow::Result<()> {
        let (store, db_path) = seeded_store("search_flow")?;
        let mut session = SearchSession::new(&store);

        let view = session.handle(Input::Text("ARBA".to_string()))?;
        assert_eq!(
            view,
            View::Matches {
                query: "ARBA".to_string(),
                classes: vec!["com.foo.BarBaz".to_string()],
                truncated: false,
            }
        );

        let View::Detail { class_name, records } = session.handle(Input::Select(1))? else {
            panic!("expected detail view");
        };
        assert_eq!(class_name, "com.foo.BarBaz");
        assert_eq!(records.len(), 2);
        assert!(matches!(session.state(), SearchState::Viewing { .. }));

        assert_eq!(session.handle(Input::Escape)?, View::Prompt);
        assert_eq!(
            session.state(),
            &SearchState::Searching {
                prefill: "ARBA".to_string()
            }
        );

        assert!(matches!(
            session.handle(Input::Select(9))?,
            View::Message(_)
        ));
        assert_eq!(session.handle(Input::Quit)?, View::Exit);
        assert_eq!(session.state(), &SearchState::Done);

        drop(session);
        drop(store);
        remove_db(&db_path);
        Ok(())
    }

    #[test]
    fn match_list_is_truncated_to_limit() -> anyhow::Result<()> {
        let (store, db_path) = seeded_store("search_limit")?;
        let mut session = SearchSession::new(&store).with_limit(1);

        let View::Matches {
            classes, truncated, ..
        } = session.handle(Input::Text("com.foo".to_string()))?
        else {
            panic!("expected matches");
        };
        assert_eq!(classes, vec!["com.foo.BarBaz".to_string()]);
        assert!(truncated);

        drop(session);
        drop(store);
        remove_db(&db_path);
        Ok(())
    }
}
