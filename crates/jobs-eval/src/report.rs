use std::collections::HashMap;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::attr_path::AttrPath;
use crate::job::JobDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportEntry {
    Job(JobDescriptor),
    Error { error: String },
}

impl ReportEntry {
    pub fn as_job(&self) -> Option<&JobDescriptor> {
        match self {
            ReportEntry::Job(job) => Some(job),
            ReportEntry::Error { .. } => None,
        }
    }

    pub fn as_error(&self) -> Option<&str> {
        match self {
            ReportEntry::Error { error } => Some(error.as_str()),
            ReportEntry::Job(_) => None,
        }
    }
}

/// How attribute paths appear as keys in the serialized report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportLayout {
    /// One JSON object level per path segment.
    #[default]
    Nested,
    /// Dot-joined paths as top-level keys.
    Flat,
}

#[derive(Debug, Default)]
pub struct ReportBuilder {
    entries: Vec<(AttrPath, ReportEntry)>,
    index: HashMap<AttrPath, usize>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_job(&mut self, path: &AttrPath, job: JobDescriptor) {
        self.record(path, ReportEntry::Job(job));
    }

    pub fn record_error(&mut self, path: &AttrPath, message: impl Into<String>) {
        self.record(
            path,
            ReportEntry::Error {
                error: message.into(),
            },
        );
    }

    /// A path is recorded at most once; a second record replaces the first
    /// in place.
    fn record(&mut self, path: &AttrPath, entry: ReportEntry) {
        match self.index.get(path) {
            Some(&at) => self.entries[at].1 = entry,
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push((path.clone(), entry));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(self) -> Report {
        Report {
            entries: self.entries,
            index: self.index,
        }
    }
}

/// The outcome of one walk, in traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    entries: Vec<(AttrPath, ReportEntry)>,
    index: HashMap<AttrPath, usize>,
}

impl Report {
    pub fn get(&self, path: &str) -> Option<&ReportEntry> {
        let at = *self.index.get(&AttrPath::parse(path))?;
        Some(&self.entries[at].1)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&AttrPath, &ReportEntry)> {
        self.entries.iter().map(|(path, entry)| (path, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn jobs(&self) -> impl Iterator<Item = (&AttrPath, &JobDescriptor)> {
        self.entries
            .iter()
            .filter_map(|(path, entry)| entry.as_job().map(|job| (path, job)))
    }

    pub fn errors(&self) -> impl Iterator<Item = (&AttrPath, &str)> {
        self.entries
            .iter()
            .filter_map(|(path, entry)| entry.as_error().map(|error| (path, error)))
    }

    /// A serializable view of the report in the requested layout.
    pub fn layout(&self, layout: ReportLayout) -> LaidOut<'_> {
        LaidOut {
            report: self,
            layout,
        }
    }

    pub fn to_json(&self, layout: ReportLayout) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.layout(layout))
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.layout(ReportLayout::default()).serialize(serializer)
    }
}

pub struct LaidOut<'a> {
    report: &'a Report,
    layout: ReportLayout,
}

impl Serialize for LaidOut<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.layout {
            ReportLayout::Flat => {
                let mut map = serializer.serialize_map(Some(self.report.len()))?;
                for (path, entry) in self.report.entries() {
                    map.serialize_entry(&path.to_string(), entry)?;
                }
                map.end()
            }
            ReportLayout::Nested => {
                let mut tree = Tree::default();
                for (path, entry) in self.report.entries() {
                    tree.insert(path, entry);
                }
                tree.serialize(serializer)
            }
        }
    }
}

/// Report entries grouped by path segment, in first-seen order.
#[derive(Default)]
struct Tree<'a> {
    children: Vec<(&'a str, Branch<'a>)>,
    index: HashMap<&'a str, usize>,
}

enum Branch<'a> {
    Leaf(&'a ReportEntry),
    Inner(Tree<'a>),
}

impl<'a> Tree<'a> {
    fn insert(&mut self, path: &'a AttrPath, entry: &'a ReportEntry) {
        let segments: Vec<&str> = if path.is_root() {
            vec![""]
        } else {
            path.segments().iter().map(String::as_str).collect()
        };
        self.insert_at(&segments, entry);
    }

    fn insert_at(&mut self, segments: &[&'a str], entry: &'a ReportEntry) {
        let (head, rest) = match segments.split_first() {
            Some(split) => split,
            None => return,
        };
        let index = match self.index.get(head) {
            Some(&index) => index,
            None => {
                self.index.insert(*head, self.children.len());
                self.children.push((*head, Branch::Inner(Tree::default())));
                self.children.len() - 1
            }
        };
        let slot = &mut self.children[index].1;
        if rest.is_empty() {
            *slot = Branch::Leaf(entry);
            return;
        }
        if let Branch::Leaf(_) = slot {
            *slot = Branch::Inner(Tree::default());
        }
        if let Branch::Inner(tree) = slot {
            tree.insert_at(rest, entry);
        }
    }
}

impl Serialize for Tree<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.children.len()))?;
        for (name, branch) in &self.children {
            match branch {
                Branch::Leaf(entry) => map.serialize_entry(name, entry)?,
                Branch::Inner(tree) => map.serialize_entry(name, tree)?,
            }
        }
        map.end()
    }
}
