mod error;
pub use error::{GenofileError, MIN_SNP_COUNT};

mod source;
pub use source::{GenomeBuild, Source};

mod parser;
pub use parser::{parse_file, ParsedFile};

mod reader;
pub use reader::{parse_path, ACCEPTED_EXTENSIONS};
