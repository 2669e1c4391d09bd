//! Command-line parsing conventions for binaries that embed the cloud
//! provider. Not used by the capability logic itself — see `SPEC_FULL.md`
//! §1: CLI front-ends are an external collaborator, not part of the core.

use clap::{AppSettings, Parser};

/// A help template that omits the binary name and version from the
/// output, matching the convention every embedding binary should use.
const NO_VERSION_HELP_TEMPLATE: &str = "{about}

USAGE:
    {usage}

{all-args}";

/// Parses command-line arguments according to a [`clap::Parser`] after
/// applying our house customizations.
pub fn parse_args<O>() -> O
where
    O: Parser,
{
    let app = O::command()
        .global_setting(AppSettings::DisableVersionFlag)
        .help_template(NO_VERSION_HELP_TEMPLATE);
    O::from_arg_matches(&app.get_matches()).unwrap_or_else(|e| e.exit())
}
