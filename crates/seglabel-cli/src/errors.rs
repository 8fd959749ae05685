use console::style;
use seglabel_core::error::SeglabelError;
use std::fmt;

/// Error with context and suggestions, shown on stderr
pub struct CliError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
    pub help_command: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
            help_command: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, command: impl Into<String>) -> Self {
        self.help_command = Some(command.into());
        self
    }

    pub fn display(&self) {
        eprintln!("{} {}\n", style("✗").red().bold(), style(&self.message).red().bold());

        if let Some(ref context) = self.context {
            eprintln!("{}", context);
            eprintln!();
        }

        if !self.suggestions.is_empty() {
            eprintln!("{}", style("To fix this:").yellow().bold());
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, suggestion);
            }
            eprintln!();
        }

        if let Some(ref help_cmd) = self.help_command {
            eprintln!("{} {}", style("Need help?").cyan(), style(help_cmd).cyan().bold());
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Layer could not be opened or decoded
pub fn layer_unreadable(error: &SeglabelError) -> CliError {
    CliError::new("Cannot read input layer")
        .with_context(format!("{}", error))
        .with_suggestion("Check the path exists and is a GeoJSON (.geojson, .json) or Shapefile (.shp)")
        .with_suggestion("For Shapefiles, keep the .shx and .dbf files next to the .shp")
        .with_help("Run: seglabel inspect <PATH>")
}

pub fn unsupported_format(error: &SeglabelError) -> CliError {
    CliError::new("Unsupported layer format")
        .with_context(format!("{}", error))
        .with_suggestion("Use a .geojson, .json or .shp extension")
        .with_help("Run: seglabel join --help")
}

/// Designated field absent or inconsistently typed
pub fn designated_field(error: &SeglabelError) -> CliError {
    CliError::new("Designated field cannot be used")
        .with_context(format!("{}", error))
        .with_suggestion("Pick a field the point layer declares: --property <NAME>")
        .with_suggestion("List the point layer's fields: seglabel inspect <POINTS>")
        .with_help("Run: seglabel join --help")
}

/// Region ids duplicated or not usable
pub fn region_identity(error: &SeglabelError) -> CliError {
    CliError::new("Region ids are not unique non-negative integers")
        .with_context(format!("{}", error))
        .with_suggestion("Point --region-id-field at a field holding unique integer ids")
        .with_suggestion("Or give every region feature a distinct integer feature id")
        .with_help("Run: seglabel inspect <SEGMENTS>")
}

pub fn invalid_config(error: &SeglabelError) -> CliError {
    CliError::new("Invalid configuration")
        .with_context(format!("{}", error))
        .with_suggestion("Pass the value on the command line, e.g. --property class")
        .with_suggestion("Or set it in the --config file or a SEGLABEL_* environment variable")
        .with_help("Run: seglabel join --help")
}

pub fn write_failed(error: &SeglabelError) -> CliError {
    CliError::new("Output was not written")
        .with_context(format!("{}\n\nNo partial output was left behind.", error))
        .with_suggestion("Check the output directory exists and is writable")
        .with_suggestion("Shapefile field names are limited to 10 characters")
}

/// Map a domain error to a CLI error with suggestions
pub fn from_seglabel(error: &SeglabelError) -> CliError {
    match error {
        SeglabelError::LayerUnreadable { .. } => layer_unreadable(error),
        SeglabelError::UnsupportedFormat { .. } => unsupported_format(error),
        SeglabelError::DesignatedFieldMissing { .. } | SeglabelError::DesignatedFieldType { .. } => {
            designated_field(error)
        }
        SeglabelError::DuplicateRegionId { .. } | SeglabelError::InvalidRegionId { .. } => {
            region_identity(error)
        }
        SeglabelError::ConfigMissing { .. } | SeglabelError::ConfigInvalid { .. } => invalid_config(error),
        SeglabelError::WriteFailed { .. } => write_failed(error),
        _ => CliError::new(error.to_string()),
    }
}

/// Convert anyhow::Error to CliError with context
pub fn from_anyhow(error: anyhow::Error) -> CliError {
    if let Some(domain) = error.chain().find_map(|cause| cause.downcast_ref::<SeglabelError>()) {
        let cli_error = from_seglabel(domain);
        let outer = error.to_string();
        if outer != domain.to_string() {
            return cli_error.with_context(format!("{}\n\n{}", outer, domain));
        }
        return cli_error;
    }

    let message = error.to_string();
    if message.contains("No such file or directory") {
        CliError::new("File not found")
            .with_context(format!("Error: {}", message))
            .with_suggestion("Check the file path and try again")
    } else if message.contains("permission denied") || message.contains("Permission denied") {
        CliError::new("Permission denied")
            .with_context(format!("Error: {}", message))
            .with_suggestion("Check file permissions")
    } else {
        CliError::new(message)
    }
}
