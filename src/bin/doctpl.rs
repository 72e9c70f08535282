//! A thin CLI over the [`doctpl`] library: fill a `.docx` template from a
//! JSON data file, or validate a template's structure and placeholders
//! without filling it (SPEC_FULL.md §6, "Expansion — CLI glue").

use doctpl::Options;

/// Errors that may occur when parsing arguments.
#[derive(Debug, thiserror::Error)]
enum ArgsError {
    /// No subcommand was given.
    #[error("missing subcommand (expected 'process' or 'validate')")]
    MissingSubcommand,
    /// An unrecognized subcommand was given.
    #[error("unknown subcommand '{0}' (expected 'process' or 'validate')")]
    UnknownSubcommand(String),
    /// `process` is missing one of its required positional arguments.
    #[error("'process' requires <template> <data.json> <output>")]
    MissingProcessArgs,
    /// `validate` is missing its required positional argument.
    #[error("'validate' requires <template> [data.json]")]
    MissingValidateArgs,
    /// Extra unknown junk on the command line.
    #[error("unknown arguments: {}", _0.display())]
    Extra(std::ffi::OsString),
    /// Some other `pico-args` parsing error.
    #[error(transparent)]
    Pico(#[from] pico_args::Error),
}

enum Command {
    Process { template: String, data: String, output: String },
    Validate { template: String, data: Option<String> },
}

impl Command {
    fn new() -> Result<Command, ArgsError> {
        let mut args = pico_args::Arguments::from_env();
        let sub = args.subcommand()?.ok_or(ArgsError::MissingSubcommand)?;
        let command = match sub.as_str() {
            "process" => {
                let template = args.opt_free_from_str::<String>()?;
                let data = args.opt_free_from_str::<String>()?;
                let output = args.opt_free_from_str::<String>()?;
                match (template, data, output) {
                    (Some(template), Some(data), Some(output)) => Command::Process { template, data, output },
                    _ => return Err(ArgsError::MissingProcessArgs),
                }
            }
            "validate" => {
                let template = args.opt_free_from_str::<String>()?.ok_or(ArgsError::MissingValidateArgs)?;
                let data = args.opt_free_from_str::<String>()?;
                Command::Validate { template, data }
            }
            other => return Err(ArgsError::UnknownSubcommand(other.to_string())),
        };

        let rest = args.finish();
        if !rest.is_empty() {
            return Err(ArgsError::Extra(rest.join(std::ffi::OsStr::new(" "))));
        }
        Ok(command)
    }
}

/// Command line usage instructions.
fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage:");
    eprintln!("  {exe} process <template.docx> <data.json> <output.docx>");
    eprintln!("  {exe} validate <template.docx> [data.json]");
}

fn read_file(path: &str) -> Result<Vec<u8>, doctpl::Error> {
    std::fs::read(path).map_err(|source| doctpl::Error::Io { path: path.into(), source })
}

fn write_file(path: &str, data: &[u8]) -> Result<(), doctpl::Error> {
    std::fs::write(path, data).map_err(|source| doctpl::Error::Io { path: path.into(), source })
}

fn run_process(template: &str, data: &str, output: &str) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Filling template {template} with data {data}");
    let template_bytes = read_file(template)?;
    let data_bytes = read_file(data)?;
    let options = Options::default();

    let result = doctpl::process(&template_bytes, &data_bytes, &options)?;
    let output_bytes = result.output.as_deref().unwrap_or_default();
    write_file(output, output_bytes)?;
    println!("Wrote {output} ({} replacements, {} warnings)", result.replacement_count, result.warnings.len());

    if !result.warnings.is_empty() {
        let report_path = format!("{output}.warnings.docx");
        write_file(&report_path, &result.warning_report_bytes()?)?;
        println!("Warning report written to {report_path}");
        for warning in &result.warnings {
            log::warn!("{}: {}", warning.category(), warning.name());
        }
    }
    Ok(())
}

fn run_validate(template: &str, data: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Validating template {template}");
    let template_bytes = read_file(template)?;
    let data_bytes = match data {
        Some(path) => read_file(path)?,
        None => b"{}".to_vec(),
    };
    let options = Options::default();

    let result = doctpl::validate_template(&template_bytes, &data_bytes, &options)?;
    println!("{} placeholders found", result.all_placeholders.len());
    for placeholder in &result.all_placeholders {
        println!("  {placeholder}");
    }
    if !result.missing_variables.is_empty() {
        println!("{} unresolved against the supplied data:", result.missing_variables.len());
        for name in &result.missing_variables {
            println!("  {name}");
        }
    }
    if result.is_valid {
        println!("Template is structurally valid.");
        Ok(())
    } else {
        for error in &result.errors {
            eprintln!("error: {error}");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let command = match Command::new() {
        Ok(command) => command,
        Err(err) => {
            usage();
            return Err(err)?;
        }
    };

    match command {
        Command::Process { template, data, output } => run_process(&template, &data, &output),
        Command::Validate { template, data } => run_validate(&template, data.as_deref()),
    }
}

/// Uses the [`Display`](std::fmt::Display) formatter for an error even when
/// the [`Debug`](std::fmt::Debug) formatter is requested.
struct DisplayError(Box<dyn std::error::Error>);

impl std::fmt::Debug for DisplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl<E: Into<Box<dyn std::error::Error>>> From<E> for DisplayError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

fn main() -> Result<(), DisplayError> {
    run().map_err(Into::into)
}
