//! Pull-based result streams.
//!
//! A stream is single-pass and owns everything it needs. Work happens
//! only inside `next()`: a stream nobody pulls never touches its backend,
//! and dropping a stream abandons whatever it had not fetched yet.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::compiler::Candidate;
use crate::model::{AnnotationRecordSet, Rank, Statement};
use crate::Result;

/// One layer of a statement pipeline.
#[async_trait]
pub trait CandidateCursor: Send {
    async fn next(&mut self) -> Result<Option<Candidate>>;
}

pub type BoxCursor = Box<dyn CandidateCursor>;

/// A cursor that yields nothing.
pub(crate) struct Exhausted;

#[async_trait]
impl CandidateCursor for Exhausted {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        Ok(None)
    }
}

/// A cursor over candidates already in memory.
pub(crate) struct Buffered(pub VecDeque<Candidate>);

#[async_trait]
impl CandidateCursor for Buffered {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        Ok(self.0.pop_front())
    }
}

/// Statements matching a filter, in backend order.
pub struct StatementStream {
    cursor: BoxCursor,
}

impl StatementStream {
    pub fn new(cursor: BoxCursor) -> Self {
        Self { cursor }
    }

    pub fn empty() -> Self {
        Self::new(Box::new(Exhausted))
    }

    /// Stream over fixed candidates.
    pub fn from_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        Self::new(Box::new(Buffered(candidates.into_iter().collect())))
    }

    pub async fn next(&mut self) -> Result<Option<Statement>> {
        Ok(self.cursor.next().await?.map(|c| c.statement))
    }

    /// Next statement with the rank its source attributes to it.
    pub async fn next_ranked(&mut self) -> Result<Option<(Statement, Rank)>> {
        Ok(self.cursor.next().await?.map(|c| (c.statement, c.rank)))
    }

    pub async fn next_candidate(&mut self) -> Result<Option<Candidate>> {
        self.cursor.next().await
    }

    /// Drain the stream.
    pub async fn collect(mut self) -> Result<Vec<Statement>> {
        let mut out = Vec::new();
        while let Some(stmt) = self.next().await? {
            out.push(stmt);
        }
        Ok(out)
    }

    pub async fn collect_ranked(mut self) -> Result<Vec<(Statement, Rank)>> {
        let mut out = Vec::new();
        while let Some(pair) = self.next_ranked().await? {
            out.push(pair);
        }
        Ok(out)
    }
}

/// The stream itself is a cursor, so stores can stack on each other.
#[async_trait]
impl CandidateCursor for StatementStream {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        self.cursor.next().await
    }
}

/// A statement paired with its annotation records, or `None` when the
/// store does not know the statement.
pub type Annotated = (Statement, Option<AnnotationRecordSet>);

#[async_trait]
pub trait AnnotationCursor: Send {
    async fn next(&mut self) -> Result<Option<Annotated>>;
}

/// Annotations for a batch of statements, one entry per input statement
/// in input order.
pub struct AnnotationStream {
    cursor: Box<dyn AnnotationCursor>,
}

impl AnnotationStream {
    pub fn new(cursor: Box<dyn AnnotationCursor>) -> Self {
        Self { cursor }
    }

    /// Every statement unknown.
    pub fn unknown(statements: Vec<Statement>) -> Self {
        Self::new(Box::new(Unknown(statements.into())))
    }

    pub async fn next(&mut self) -> Result<Option<Annotated>> {
        self.cursor.next().await
    }

    pub async fn collect(mut self) -> Result<Vec<Annotated>> {
        let mut out = Vec::new();
        while let Some(entry) = self.next().await? {
            out.push(entry);
        }
        Ok(out)
    }
}

struct Unknown(VecDeque<Statement>);

#[async_trait]
impl AnnotationCursor for Unknown {
    async fn next(&mut self) -> Result<Option<Annotated>> {
        Ok(self.0.pop_front().map(|s| (s, None)))
    }
}
