use crate::error::Result;
use crate::value::{Attrs, Evaluator, Whnf};

/// What a forced node of the release tree turned out to be.
#[derive(Debug, Clone)]
pub enum Node<V> {
    /// A derivation. Its members are read by the job extractor.
    Job(Attrs<V>),
    /// A plain attribute set whose members are explored in turn.
    Group(Attrs<V>),
    /// `null`, meaning "nothing here".
    Empty,
    /// Anything else, kept in rendered form for the error message.
    Unsupported(String),
}

/// An attribute set is a derivation when its `type` member forces to the
/// string `"derivation"`.
pub fn is_derivation<E: Evaluator>(eval: &E, attrs: &Attrs<E::Value>) -> Result<bool> {
    match attrs.get("type") {
        Some(ty) => Ok(matches!(eval.force(ty)?, Whnf::Str(s) if s == "derivation")),
        None => Ok(false),
    }
}

pub fn classify<E: Evaluator>(eval: &E, forced: Whnf<E::Value>) -> Result<Node<E::Value>> {
    Ok(match forced {
        Whnf::Attrs(attrs) => {
            if is_derivation(eval, &attrs)? {
                Node::Job(attrs)
            } else {
                Node::Group(attrs)
            }
        }
        Whnf::Null => Node::Empty,
        other => Node::Unsupported(other.show()),
    })
}
