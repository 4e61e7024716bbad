use snafu::{Location, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AllocError {
    #[snafu(display("out of memory: cannot allocate {requested} bytes"))]
    OutOfMemory {
        requested: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("double free of heap block at offset {offset:#x}"))]
    DoubleFree {
        offset: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("offset {offset:#x} is not the payload of a heap block"))]
    InvalidBlock {
        offset: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

impl AllocError {
    #[must_use]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }

    #[must_use]
    pub fn is_double_free(&self) -> bool {
        matches!(self, Self::DoubleFree { .. })
    }
}
