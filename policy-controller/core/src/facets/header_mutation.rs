use super::{validate_header_name, SubIr};
use crate::{
    xds::config::{HeaderMutationRule, Mutations},
    Facet, ValidationError,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderMutationIr {
    pub mutations: Mutations,
}

impl SubIr for HeaderMutationIr {
    const FACET: Facet = Facet::HeaderMutation;

    fn validate(&self) -> Result<(), ValidationError> {
        let rules = self
            .mutations
            .request_mutations
            .iter()
            .chain(&self.mutations.response_mutations);
        for rule in rules {
            match rule {
                HeaderMutationRule::Append(h) => {
                    validate_header_name("headerModifiers.name", &h.header.key)?
                }
                HeaderMutationRule::Remove(name) => {
                    validate_header_name("headerModifiers.remove", name)?
                }
            }
        }
        Ok(())
    }
}
