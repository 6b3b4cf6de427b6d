use crate::{
    cli::{context::load_context, Args},
    config::Settings,
    constants::STDIN_INDICATOR,
    error::Result,
    ioutils::read_from,
    pipeline::{RenderRequest, Templar},
};
use std::io::Write;

/// Main CLI runner: settings, template and context in, rendered text out.
pub struct Runner {
    args: Args,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        Self { args }
    }

    /// Executes one render call
    pub fn run(self) -> Result<()> {
        if self.args.template == STDIN_INDICATOR
            && self.args.context.as_deref() == Some(STDIN_INDICATOR)
        {
            return Err(anyhow::anyhow!("Template and context cannot both be read from stdin").into());
        }

        let settings = Settings::load_or_default(&self.args.settings)?;
        let templar = Templar::new(settings);

        let source = self.read_template()?;
        let context = load_context(self.args.context.as_deref())?;

        let mut request = RenderRequest::new(source)
            .with_context(context)
            .with_template_type(self.args.template_type.as_str());
        request.output_path = self.args.output.clone();

        let result = templar.render(&request)?;
        for diagnostic in &result.diagnostics {
            log::info!("{diagnostic}");
        }

        match &self.args.output {
            Some(path) => log::info!("Rendered template written to {}", path.display()),
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(result.text.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }

    fn read_template(&self) -> Result<String> {
        if self.args.template == STDIN_INDICATOR {
            read_from(std::io::stdin())
        } else {
            Ok(std::fs::read_to_string(&self.args.template)?)
        }
    }
}

/// Convenience entry point for the binary.
pub fn run(args: Args) -> Result<()> {
    Runner::new(args).run()
}
