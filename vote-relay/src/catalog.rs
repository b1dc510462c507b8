use std::{collections::HashSet, path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollOption {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOption>,
}

impl Poll {
    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|option| option.id == option_id)
    }
}

/// Immutable, ordered set of polls loaded once at startup.
///
/// Cloning is cheap; every clone shares the same poll definitions.
#[derive(Debug, Clone)]
pub struct Catalog {
    polls: Arc<[Poll]>,
}

impl Catalog {
    pub fn new(polls: Vec<Poll>) -> Result<Self> {
        let mut poll_ids = HashSet::new();
        for poll in &polls {
            if !poll_ids.insert(poll.id.as_str()) {
                bail!("duplicate poll id '{}'", poll.id);
            }

            let mut option_ids = HashSet::new();
            for option in &poll.options {
                if !option_ids.insert(option.id.as_str()) {
                    bail!("duplicate option id '{}' in poll '{}'", option.id, poll.id);
                }
            }
        }

        Ok(Self {
            polls: polls.into(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let polls: Vec<Poll> = serde_json::from_str(json).context("invalid poll catalog")?;
        Self::new(polls)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read poll catalog {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("failed to load {}", path.display()))
    }

    pub fn polls(&self) -> &[Poll] {
        &self.polls
    }

    pub fn poll(&self, poll_id: &str) -> Option<&Poll> {
        self.polls.iter().find(|poll| poll.id == poll_id)
    }

    pub fn poll_ids(&self) -> impl Iterator<Item = &str> {
        self.polls.iter().map(|poll| poll.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            polls: default_polls().into(),
        }
    }
}

fn poll(id: &str, question: &str, options: &[(&str, &str)]) -> Poll {
    Poll {
        id: id.to_string(),
        question: question.to_string(),
        options: options
            .iter()
            .map(|(id, label)| PollOption {
                id: id.to_string(),
                label: label.to_string(),
            })
            .collect(),
    }
}

fn default_polls() -> Vec<Poll> {
    vec![
        poll(
            "p1",
            "What is your favorite programming language?",
            &[("a", "JavaScript"), ("b", "Python"), ("c", "Rust"), ("d", "Go")],
        ),
        poll(
            "p2",
            "How do you prefer to work?",
            &[("a", "Fully remote"), ("b", "Hybrid"), ("c", "In office")],
        ),
        poll(
            "p3",
            "What matters most in software?",
            &[
                ("a", "Performance"),
                ("b", "Developer experience"),
                ("c", "Reliability"),
                ("d", "Security"),
            ],
        ),
    ]
}
