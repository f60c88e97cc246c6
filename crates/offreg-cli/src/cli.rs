use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    after_help = "Arguments that are not npm tarballs or package directories are passed to npm,\n\
                  e.g. `offreg ./vendor/*.tgz install --no-save`"
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long)]
    pub quiet: bool,

    /// Output logs as json
    #[arg(short, long)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Serve the registry until interrupted instead of running npm
    #[arg(long)]
    pub debug: bool,

    /// Write the default configuration file and exit
    #[arg(long, exclusive = true)]
    pub defconfig: bool,

    /// Tarballs, package directories and npm arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

impl Args {
    /// Takes `--debug` and `--help` out of the pass-through arguments, so they
    /// work anywhere on the command line and never reach npm.
    ///
    /// Returns `true` when help was asked for.
    pub fn lift_own_flags(&mut self) -> bool {
        let mut help = false;
        let mut debug = false;
        self.args.retain(|arg| match arg.as_str() {
            "--help" => {
                help = true;
                false
            }
            "--debug" => {
                debug = true;
                false
            }
            _ => true,
        });
        self.debug |= debug;
        help
    }
}
