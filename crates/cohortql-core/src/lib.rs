pub mod criteria;
pub mod error;
pub mod request;

pub use criteria::{
    AttrName, CriteriaSubType, CriteriaType, Domain, ModifierType, Operator, TemporalMention,
    TemporalTime, TypeFamily,
};
pub use error::{CoreError, Result};
pub use request::{Attribute, Modifier, SearchGroup, SearchGroupItem, SearchParameter, SearchRequest};
