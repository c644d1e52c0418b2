//! Class 90: `tx.*`. Grounded on
//! `examples/original_source/grabbit/grabbit/methods/tx.py`. All six methods
//! carry no arguments; the class exists purely to move a channel into and
//! out of a transactional mode.

use crate::error::AmqpResult;

pub const CLASS_ID: u16 = 90;

pub mod method_id {
    pub const SELECT: u16 = 10;
    pub const SELECT_OK: u16 = 11;
    pub const COMMIT: u16 = 20;
    pub const COMMIT_OK: u16 = 21;
    pub const ROLLBACK: u16 = 30;
    pub const ROLLBACK_OK: u16 = 31;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxMethod {
    Select(Select),
    SelectOk(SelectOk),
    Commit(Commit),
    CommitOk(CommitOk),
    Rollback(Rollback),
    RollbackOk(RollbackOk),
}

impl TxMethod {
    #[must_use]
    pub fn method_id(&self) -> u16 {
        match self {
            TxMethod::Select(_) => method_id::SELECT,
            TxMethod::SelectOk(_) => method_id::SELECT_OK,
            TxMethod::Commit(_) => method_id::COMMIT,
            TxMethod::CommitOk(_) => method_id::COMMIT_OK,
            TxMethod::Rollback(_) => method_id::ROLLBACK,
            TxMethod::RollbackOk(_) => method_id::ROLLBACK_OK,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        Vec::new()
    }

    pub fn unpack(method_id: u16, data: &[u8]) -> AmqpResult<(TxMethod, &[u8])> {
        use method_id as id;
        Ok(match method_id {
            id::SELECT => (TxMethod::Select(Select), data),
            id::SELECT_OK => (TxMethod::SelectOk(SelectOk), data),
            id::COMMIT => (TxMethod::Commit(Commit), data),
            id::COMMIT_OK => (TxMethod::CommitOk(CommitOk), data),
            id::ROLLBACK => (TxMethod::Rollback(Rollback), data),
            id::ROLLBACK_OK => (TxMethod::RollbackOk(RollbackOk), data),
            other => {
                return Err(crate::error::AmqpError::SyntaxError {
                    reason: format!("unknown tx method id {other}"),
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Select;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectOk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Commit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitOk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rollback;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RollbackOk;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_round_trips_through_the_registry() {
        let (m, rest) = TxMethod::unpack(method_id::SELECT, &[]).unwrap();
        assert_eq!(m, TxMethod::Select(Select));
        assert!(rest.is_empty());
        assert!(m.pack().is_empty());
    }

    #[test]
    fn commit_ok_round_trips() {
        let (m, rest) = TxMethod::unpack(method_id::COMMIT_OK, &[]).unwrap();
        assert_eq!(m, TxMethod::CommitOk(CommitOk));
        assert!(rest.is_empty());
    }
}
