use std::{
    error::Error,
    ffi::OsStr,
    fmt::{self, Display, Formatter},
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::debug;
use serde::{Deserialize, Serialize};

mod error;
pub use error::ParserError;

/// CAIRN-rs: Continental Ancestry Inference from Raw geNotypes
#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(name="cairn-rs", author, version, about, long_about = None)]
#[clap(propagate_version = true)]
pub struct Cli {
    /// Set the verbosity level (-v -vv -vvv)
    ///
    /// Set the verbosity level of this program. Multiple levels allowed {n}
    ///
    /// -v: Info  |  -vv: Debug  | -vvv: Trace {n}
    ///
    /// Note that the program will still output warnings by default, even when this flag is off.
    /// Use --quiet/-q to disable them.
    #[clap(short='v', long, parse(from_occurrences), global=true)]
    pub verbose: u8,

    /// Disable warnings.
    ///
    /// By default, warnings are emitted and redirected to the console, even when verbose mode is off.
    /// Use this argument to disable this. Only errors will be displayed.
    #[clap(short='q', long, global=true)]
    pub quiet: bool,

    #[clap(subcommand)]
    pub commands: Commands,
}

impl Cli {
    /// Serialize command line arguments within a `.yaml` file.
    ///
    /// # Behavior
    /// - File naming follows the convention '{current time}-{module name}.yaml'. Current time
    ///   follows the format `YYYY`-`MM`-`DD`T`hhmmss`
    /// - The file is written at the root of the user-provided `--output-dir` folder.
    ///
    /// # Errors
    /// Sends an unrecoverable error if `serde_yaml` fails to parse `Self` to a string.
    pub fn serialize(&self) -> Result<(), Box<dyn Error>> {
        let serialized = serde_yaml::to_string(&self)
            .map_err(|err| format!("Failed to serialize command line arguments. got [{err}]"))?;

        debug!("\n---- Command line args ----\n{}\n---", serialized);

        let current_time = chrono::offset::Local::now().format("%Y-%m-%dT%H%M%S").to_string();

        let output_file = match &self.commands {
            Commands::Infer {common, infer: _} => {
                let dir_string = common.output_dir.to_str().expect("Invalid characters in directory");
                format!("{dir_string}/{current_time}-infer.yaml")
            },
            Commands::Validate {common, validate: _} => {
                let dir_string = common.output_dir.to_str().expect("Invalid characters in directory");
                format!("{dir_string}/{current_time}-validate.yaml")
            },
            Commands::BuildAims {common, build: _} => {
                let dir_string = common.output_dir.to_str().expect("Invalid characters in directory");
                format!("{dir_string}/{current_time}-build-aims.yaml")
            },
            Commands::FromYaml {yaml: _} => return Ok(()),
        };

        match std::fs::write(&output_file, serialized) {
            Err(e) => Err(format!("Unable to serialize arguments into {output_file}: [{e}]").into()),
            Ok(()) => Ok(()),
        }
    }

    /// Deserialize a `.yaml` file into command line arguments.
    ///
    /// # Errors
    /// - Returns `FileNotFound` or `PermissionDenied` if the provided `.yaml` is invalid,
    ///   or does not carry read permissions.
    /// - Sends an unrecoverable error if `serde_yaml` fails to parse the provided file to `Self`.
    pub fn deserialize(yaml: &Path) -> Result<Self, Box<dyn Error>> {
        Ok(serde_yaml::from_reader(File::open(yaml)?)?)
    }
}

#[derive(Subcommand, Debug, Serialize, Deserialize)]
pub enum Commands {
    /// Infer global admixture and local ancestry from a consumer genotype file.
    Infer {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        infer: Infer,
    },

    /// Evaluate classifier accuracy through leave-one-out panel validation.
    Validate {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        validate: Validate,
    },

    /// Build or extend the AIM database from an external variant service (offline).
    BuildAims {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        build: Box<AimBuild>,
    },

    /// Run cairn-rs using a previously generated .yaml configuration file.
    ///
    /// This allows users to easily re-apply a cairn-rs command using the exact same
    /// parameters and arguments.
    FromYaml {
        yaml: PathBuf,
    },
}

#[derive(Parser, Debug, Default, Serialize, Deserialize)]
pub struct Common {
    /// Path to the AIM database (JSON).
    ///
    /// The catalogue of ancestry-informative markers with per-population alternate-allele
    /// frequencies, as emitted by the 'build-aims' subcommand.
    #[clap(short='a', long, parse(try_from_os_str=valid_input_file))]
    pub aim_db: PathBuf,

    /// Path to the reference panel genotype document (JSON).
    ///
    /// Carries the packed genotype strings of every reference individual. Must be
    /// provided together with --panel-meta. When absent, inference falls back to the
    /// AIM-only EM estimate.
    #[clap(short='p', long, required(false), parse(try_from_os_str=valid_input_file))]
    pub panel: Option<PathBuf>,

    /// Path to the reference panel metadata document (JSON).
    ///
    /// Maps each reference individual onto its subpopulation code, continental
    /// superpopulation, and column offset within the genotype strings.
    #[clap(short='m', long, required(false), parse(try_from_os_str=valid_input_file))]
    pub panel_meta: Option<PathBuf>,

    /// Output directory where results will be written.
    ///
    /// Note that cairn-rs will create the specified leaf directory if it is not present,
    /// but does not allow itself from creating parent directories.
    #[clap(short='o', long, default_value("cairn-output"), parse(try_from_os_str=valid_output_dir))]
    pub output_dir: PathBuf,

    /// Overwrite existing output files.
    ///
    /// By default, cairn-rs does not allow itself from overwriting existing result files.
    /// Use this flag to force this behaviour.
    #[clap(short='w', long)]
    pub overwrite: bool,
}

impl Common {
    /// Check if a given file already exists; raise an error if such is the case, and the
    /// user did not explicitly allow file overwriting.
    ///
    /// # Errors
    /// - If the provided `path` already exists and the user did not specifically allow
    ///   overwrites through the `--overwrite` argument.
    pub fn can_write_file(&self, path: &Path) -> Result<bool> {
        if !self.overwrite && path.exists() {
            return Err(ParserError::CannotOverwrite(path.display().to_string()))
                .context("While preparing output files");
        }
        Ok(true)
    }
}

/// Infer global admixture and per-chromosome ancestry segments.
#[derive(Parser, Debug, Default, Serialize, Deserialize)]
pub struct Infer {
    /// Input genotype file (23andMe or AncestryDNA export).
    ///
    /// Tab-delimited text, optionally gzipped. Accepted extensions: '.txt', '.csv',
    /// optionally followed by '.gz'. Vendor and genome build are detected from the
    /// '#' header block.
    #[clap(short='i', long, parse(try_from_os_str=valid_input_file))]
    pub input: PathBuf,

    /// Override the HMM switch rate (rho).
    ///
    /// By default, rho is derived per chromosome from the mean inter-marker spacing so
    /// that the expected ancestry-segment length is around 20 cM. Provide a hard value
    /// to bypass this heuristic.
    #[clap(short='r', long, required(false))]
    pub switch_scale: Option<f64>,

    /// Number of parallel worker threads.
    ///
    /// Parallelization is dispatched across reference samples (k-NN scan) and across
    /// chromosomes (HMM smoothing).
    #[clap(short='@', long, default_value("1"))]
    pub threads: usize,
}

/// Leave-one-out panel evaluation.
#[derive(Parser, Debug, Default, Serialize, Deserialize)]
pub struct Validate {
    /// Maximum number of held-out test samples per continental population.
    #[clap(short='n', long, default_value("10"))]
    pub max_per_pop: usize,

    /// Provide the test-sample picker with a set seed.
    #[clap(long, default_value_t=fastrand::u64(u64::MIN..=u64::MAX))]
    pub seed: u64,

    /// Number of parallel worker threads.
    #[clap(short='@', long, default_value("1"))]
    pub threads: usize,
}

/// Offline AIM database construction.
#[derive(Args, Debug, Default, Serialize, Deserialize)]
pub struct AimBuild {
    /// Path to a text file holding one candidate rsid per line.
    #[clap(short='s', long, parse(try_from_os_str=valid_input_file))]
    pub seed_rsids: PathBuf,

    /// Path to an existing AIM database to deduplicate against and extend.
    #[clap(short='e', long, required(false), parse(try_from_os_str=valid_input_file))]
    pub existing: Option<PathBuf>,

    /// Base URL of the external variant service.
    #[clap(short='u', long, default_value("https://rest.ensembl.org"))]
    pub url: String,

    /// Minimum five-population FST required to keep a marker.
    #[clap(short='f', long, default_value("0.08"))]
    pub fst_threshold: f64,

    /// Number of rsids per service request (capped at 200).
    #[clap(short='b', long, default_value("200"))]
    pub batch_size: usize,

    /// Early-stop threshold: end the build after this many new markers.
    #[clap(short='M', long, default_value("5000"))]
    pub max_new_markers: usize,

    /// File name of the emitted database, within the output directory.
    #[clap(short='O', long, default_value("aim-database.json"))]
    pub output_file: String,
}

#[derive(Debug, Clone, Copy)]
pub enum FileEntity {
    File,
    Directory,
}

impl Display for FileEntity {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::File      => write!(f, "File"),
            Self::Directory => write!(f, "Directory"),
        }
    }
}

impl FileEntity {
    fn validate(&self, path: &Path) -> Result<(), ParserError> {
        use ParserError::InvalidFileEntity;
        let valid = match self {
            Self::File      => path.is_file(),
            Self::Directory => path.is_dir(),
        };

        if valid {
            Ok(())
        } else {
            Err(InvalidFileEntity(*self, path.display().to_string()))
        }
    }
}

fn assert_filesystem_entity_is_valid(s: &OsStr, entity: &FileEntity) -> Result<()> {
    use ParserError::MissingFileEntity;
    let path = Path::new(s);
    if !path.exists() {
        return Err(MissingFileEntity(*entity, path.display().to_string()))
            .context("While parsing arguments");
    }

    entity.validate(path).context("While parsing arguments")
}

fn valid_input_file(s: &OsStr) -> Result<PathBuf> {
    assert_filesystem_entity_is_valid(s, &FileEntity::File)
        .context("While checking for file validity")?;
    Ok(PathBuf::from(s))
}

fn valid_output_dir(s: &OsStr) -> Result<PathBuf> {
    if !Path::new(s).exists() {
        std::fs::create_dir(s)?;
    }
    assert_filesystem_entity_is_valid(s, &FileEntity::Directory)
        .context("While checking for directory validity")?;
    Ok(PathBuf::from(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_file_validator_rejects_missing_paths() {
        assert!(valid_input_file(OsStr::new("/definitely/not/here.txt")).is_err());
    }

    #[test]
    fn input_file_validator_rejects_directories() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(valid_input_file(dir.path().as_os_str()).is_err());
        Ok(())
    }

    #[test]
    fn output_dir_validator_creates_the_leaf() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("results");
        let validated = valid_output_dir(target.as_os_str())?;
        assert!(validated.is_dir());
        Ok(())
    }

    #[test]
    fn overwrite_guard() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("out.json");
        std::fs::write(&file, "{}")?;

        let mut common = Common { output_dir: dir.path().to_path_buf(), ..Default::default() };
        assert!(common.can_write_file(&file).is_err());
        common.overwrite = true;
        assert!(common.can_write_file(&file).is_ok());
        Ok(())
    }
}
