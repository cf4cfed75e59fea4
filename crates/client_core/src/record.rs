//! Records that can be listed, filtered, selected and bulk-mutated.

use std::{fmt, hash::Hash};

use shared::{
    domain::{
        Honour, HonourField, HonourId, Member, MemberField, MemberId, NoFlag, RegistrationFlag,
    },
    protocol::{HonourQuery, MemberQuery},
};

/// A row in a list screen.
///
/// `Field` names the scalar columns a bulk operation may overwrite, `Flag` the
/// boolean entries of the record's nested flag bag, and `Filter` the predicate
/// that decides which records are visible.
pub trait Record: Clone + fmt::Debug + Send + Sync + 'static {
    type Id: Clone + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    type Field: Copy + fmt::Debug + fmt::Display + Send + Sync + 'static;
    type Flag: Copy + fmt::Debug + fmt::Display + Send + Sync + 'static;
    type Filter: Clone + Default + fmt::Debug + Send + Sync + 'static;

    /// Singular noun used in prompts and audit details.
    const NOUN: &'static str;

    fn id(&self) -> &Self::Id;

    fn matches(&self, filter: &Self::Filter) -> bool;

    fn flag_path(flag: Self::Flag) -> String {
        flag.to_string()
    }

    fn noun(count: usize) -> String {
        if count == 1 {
            Self::NOUN.to_string()
        } else {
            format!("{}s", Self::NOUN)
        }
    }
}

impl Record for Member {
    type Id = MemberId;
    type Field = MemberField;
    type Flag = RegistrationFlag;
    type Filter = MemberQuery;

    const NOUN: &'static str = "member";

    fn id(&self) -> &MemberId {
        &self.id
    }

    fn matches(&self, filter: &MemberQuery) -> bool {
        filter.matches(self)
    }

    fn flag_path(flag: RegistrationFlag) -> String {
        flag.path()
    }
}

impl Record for Honour {
    type Id = HonourId;
    type Field = HonourField;
    type Flag = NoFlag;
    type Filter = HonourQuery;

    const NOUN: &'static str = "honour";

    fn id(&self) -> &HonourId {
        &self.id
    }

    fn matches(&self, filter: &HonourQuery) -> bool {
        filter.matches(self)
    }
}
