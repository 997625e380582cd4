//! Command-line-tool-backed collaborators.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::error::{ExternalError, ExternalResult};
use super::{BundleExtractor, CodecDecoder, ContainerDecoder};

/// A program plus argument templates with `{input}`, `{output}` and `{key}`
/// placeholders.
///
/// Arguments are split on whitespace; no shell is involved. When no key is
/// supplied, arguments mentioning `{key}` are dropped together with a
/// directly preceding flag (`--key {key}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    /// Parse a template line.
    pub fn parse(template: &str) -> ExternalResult<Self> {
        let mut parts = template.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| ExternalError::InvalidTemplate(template.to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// The program to run.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Substitute placeholders and return the resulting argument list.
    pub fn render_args(&self, input: &Path, output: &Path, key: Option<&str>) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let mut rendered: Vec<String> = Vec::with_capacity(self.args.len());

        for arg in &self.args {
            if arg.contains("{key}") {
                match key {
                    Some(key) => {
                        rendered.push(arg.replace("{key}", key));
                        continue;
                    }
                    None => {
                        if rendered.last().is_some_and(|prev| prev.starts_with('-')) {
                            rendered.pop();
                        }
                        continue;
                    }
                }
            }
            rendered.push(
                arg.replace("{input}", &input)
                    .replace("{output}", &output),
            );
        }
        rendered
    }

    /// Run the command and wait for it.
    pub fn run(&self, input: &Path, output: &Path, key: Option<&str>) -> ExternalResult<()> {
        let args = self.render_args(input, output, key);
        debug!(program = %self.program, ?args, "Running external tool");

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| ExternalError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ExternalError::Failed {
                program: self.program.clone(),
                input: input.to_path_buf(),
                status: result.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

fn ensure_dir(path: &Path) -> ExternalResult<()> {
    fs::create_dir_all(path).map_err(|e| ExternalError::CreateDirFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Bundle extractor running a configured command per category directory.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    template: CommandTemplate,
}

impl CommandExtractor {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

impl BundleExtractor for CommandExtractor {
    fn extract(&self, input_dir: &Path, output_dir: &Path) -> ExternalResult<()> {
        ensure_dir(output_dir)?;
        self.template.run(input_dir, output_dir, None)
    }
}

/// Container decoder running a configured command per container file.
#[derive(Debug, Clone)]
pub struct CommandContainerDecoder {
    template: CommandTemplate,
}

impl CommandContainerDecoder {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

impl ContainerDecoder for CommandContainerDecoder {
    fn unpack(&self, container: &Path, output_dir: &Path) -> ExternalResult<()> {
        ensure_dir(output_dir)?;
        self.template.run(container, output_dir, None)
    }
}

/// Codec decoder writing `<input stem>.<output_extension>` beside the input.
#[derive(Debug, Clone)]
pub struct CommandCodecDecoder {
    template: CommandTemplate,
    output_extension: String,
}

impl CommandCodecDecoder {
    pub fn new(template: CommandTemplate, output_extension: impl Into<String>) -> Self {
        Self {
            template,
            output_extension: output_extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// Where the decoded file for `input` is written.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        input.with_extension(&self.output_extension)
    }
}

impl CodecDecoder for CommandCodecDecoder {
    fn decode(&self, input: &Path, key: Option<&str>) -> ExternalResult<PathBuf> {
        let output = self.output_path(input);
        self.template.run(input, &output, key)?;
        if !output.is_file() {
            return Err(ExternalError::MissingOutput {
                program: self.template.program().to_string(),
                expected: output,
            });
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_rejects_empty_template() {
        assert!(matches!(
            CommandTemplate::parse("   "),
            Err(ExternalError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let template = CommandTemplate::parse("tool -i {input} --out={output} -k {key}").unwrap();
        let args = template.render_args(Path::new("/a"), Path::new("/b"), Some("k1"));
        assert_eq!(args, vec!["-i", "/a", "--out=/b", "-k", "k1"]);
    }

    #[test]
    fn test_render_drops_key_flag_without_key() {
        let template = CommandTemplate::parse("tool {input} --key {key} {output}").unwrap();
        let args = template.render_args(Path::new("/a"), Path::new("/b"), None);
        assert_eq!(args, vec!["/a", "/b"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_extractor_runs_command() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in");
        let output = temp.path().join("out");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("bundle.bin"), b"x").unwrap();

        let extractor =
            CommandExtractor::new(CommandTemplate::parse("cp -R {input}/. {output}").unwrap());
        extractor.extract(&input, &output).unwrap();

        assert!(output.join("bundle.bin").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_reports_failure() {
        let temp = TempDir::new().unwrap();
        let extractor = CommandExtractor::new(CommandTemplate::parse("false").unwrap());
        let result = extractor.extract(temp.path(), &temp.path().join("out"));
        assert!(matches!(result, Err(ExternalError::Failed { .. })));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let template = CommandTemplate::parse("assetdelta-no-such-tool {input}").unwrap();
        let result = template.run(temp.path(), temp.path(), None);
        assert!(matches!(result, Err(ExternalError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_codec_decoder_checks_output() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("voice.hca");
        fs::write(&input, b"enc").unwrap();

        let decoder =
            CommandCodecDecoder::new(CommandTemplate::parse("cp {input} {output}").unwrap(), ".wav");
        let output = decoder.decode(&input, None).unwrap();
        assert_eq!(output, temp.path().join("voice.wav"));

        let silent = CommandCodecDecoder::new(CommandTemplate::parse("true").unwrap(), "wav");
        let other = temp.path().join("other.hca");
        fs::write(&other, b"enc").unwrap();
        assert!(matches!(
            silent.decode(&other, None),
            Err(ExternalError::MissingOutput { .. })
        ));
    }
}
