use super::{validate_header_name, SubIr};
use crate::{
    xds::config::{BodyTransformation, RouteTransformation, Transformation},
    Facet, ValidationError,
};

/// Request and response transformations, applied in order.
///
/// This is the only facet whose entries may be concatenated when policies are
/// merged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransformationIr {
    pub transformations: Vec<RouteTransformation>,
}

impl TransformationIr {
    /// Adds `other`'s entries after this policy's entries.
    pub fn append(&mut self, other: &Self) {
        self.transformations
            .extend(other.transformations.iter().cloned());
    }

    /// Adds `other`'s entries before this policy's entries.
    pub fn prepend(&mut self, other: &Self) {
        let mut transformations = other.transformations.clone();
        transformations.append(&mut self.transformations);
        self.transformations = transformations;
    }
}

impl SubIr for TransformationIr {
    const FACET: Facet = Facet::Transformation;

    fn validate(&self) -> Result<(), ValidationError> {
        for rt in &self.transformations {
            if rt.request.is_none() && rt.response.is_none() {
                return Err(ValidationError::Missing(
                    "transformation.request or transformation.response",
                ));
            }
            for t in rt.request.iter().chain(rt.response.iter()) {
                validate_transformation(t)?;
            }
        }
        Ok(())
    }
}

fn validate_transformation(t: &Transformation) -> Result<(), ValidationError> {
    for name in t.headers.keys() {
        validate_header_name("transformation.set.name", name)?;
    }
    for h in &t.headers_to_append {
        validate_header_name("transformation.add.name", &h.key)?;
    }
    for name in &t.headers_to_remove {
        validate_header_name("transformation.remove", name)?;
    }
    if let Some(BodyTransformation::Template { text, .. }) = &t.body {
        if text.is_empty() {
            return Err(ValidationError::Missing("transformation.body.value"));
        }
    }
    Ok(())
}
