use super::SubIr;
use crate::{
    xds::config::{Buffer, BufferPerRoute},
    Facet, ValidationError,
};

/// Buffers request bodies up to a limit before forwarding them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferIr {
    pub max_request_bytes: u32,
}

impl BufferIr {
    pub fn per_route(&self) -> BufferPerRoute {
        BufferPerRoute {
            buffer: Buffer {
                max_request_bytes: self.max_request_bytes,
            },
        }
    }
}

impl SubIr for BufferIr {
    const FACET: Facet = Facet::Buffer;

    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_request_bytes == 0 {
            return Err(ValidationError::out_of_range(
                "buffer.maxRequestSize",
                0u32,
                1u32,
                u32::MAX,
            ));
        }
        Ok(())
    }
}
