pub mod descriptors;
pub mod section;
pub mod pat;
pub mod pmt;
pub mod scte35;

pub use descriptors::{Ac3Descriptor, EbpDescriptor, EbpPartition};
pub use pat::{parse_pat, PatSection};
pub use pmt::{parse_pmt, EsInfo, PmtSection};
pub use scte35::{parse_splice_info, SpliceInfoSection};
pub use section::SectionAssembler;
