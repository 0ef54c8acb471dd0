//! Remote copy pipeline: encode, split, upload, restore, clean up

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chunk::ChunkPlan;
use crate::command::ScriptTemplate;
use crate::config::CopyConfig;
use crate::coordinator::{UploadCoordinator, UploadSettings};
use crate::encode::{encoder_for, ensure_command_safe, Encoder};
use crate::error::{CopyError, Result};
use crate::executor::RemoteExecutor;
use crate::logger::CopyLogger;

/// What one successful copy did
#[derive(Debug, Clone)]
pub struct CopyReport {
    pub token: String,
    pub bytes_read: u64,
    pub encoded_len: usize,
    pub chunks: usize,
    pub elapsed: Duration,
}

pub struct RemoteCopier {
    executor: Arc<dyn RemoteExecutor>,
    config: CopyConfig,
    logger: Arc<dyn CopyLogger>,
    encoder: Option<Arc<dyn Encoder>>,
}

impl RemoteCopier {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        config: CopyConfig,
        logger: Arc<dyn CopyLogger>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            executor,
            config,
            logger,
            encoder: None,
        })
    }

    /// Use `encoder` instead of the one implied by `config.container`.
    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn config(&self) -> &CopyConfig {
        &self.config
    }

    /// Copy a local file to `destination` on the remote side.
    pub async fn copy_file(&self, src: &Path, destination: &str) -> Result<CopyReport> {
        let file = match File::open(src) {
            Ok(f) => f,
            Err(e) => {
                self.logger.error("open", destination, &e.to_string());
                return Err(e.into());
            }
        };
        self.copy(file, destination).await
    }

    /// Copy everything readable from `source` to `destination`.
    pub async fn copy<R>(&self, source: R, destination: &str) -> Result<CopyReport>
    where
        R: Read + Send + 'static,
    {
        let template = ScriptTemplate::with_random_token(self.config.temp_dir.as_str());
        self.copy_with_template(source, destination, template).await
    }

    async fn copy_with_template<R>(
        &self,
        source: R,
        destination: &str,
        template: ScriptTemplate,
    ) -> Result<CopyReport>
    where
        R: Read + Send + 'static,
    {
        match self.run_copy(source, destination, template).await {
            Ok(report) => {
                self.logger
                    .done(report.bytes_read, report.chunks, report.elapsed.as_secs_f64());
                Ok(report)
            }
            Err(e) => {
                self.logger.error("copy", destination, &e.to_string());
                Err(e)
            }
        }
    }

    async fn run_copy<R>(
        &self,
        source: R,
        destination: &str,
        template: ScriptTemplate,
    ) -> Result<CopyReport>
    where
        R: Read + Send + 'static,
    {
        let started = Instant::now();
        let encoder: Arc<dyn Encoder> = match &self.encoder {
            Some(e) => Arc::clone(e),
            None => Arc::from(encoder_for(self.config.container, destination)),
        };

        // Restore and cleanup travel over the same length-limited transport
        let restore_cmd = template.assemble(destination, encoder.remote_decode());
        let cleanup_cmd = template.cleanup();
        self.check_length("restore", &restore_cmd)?;
        self.check_length("cleanup", &cleanup_cmd)?;

        // Nothing remote happens until the payload is packaged
        let enc = Arc::clone(&encoder);
        let encoded = tokio::task::spawn_blocking(move || {
            let mut source = source;
            enc.encode(&mut source)
        })
        .await
        .map_err(|e| CopyError::Encoding(format!("encoder task failed: {e}")))??;
        ensure_command_safe(&encoded.payload)?;

        let plan = ChunkPlan::split(
            &encoded.payload,
            &template,
            self.config.command_length_ceiling,
        )?;
        let chunks = plan.len();
        self.logger.start(destination, template.token(), chunks);

        let coordinator = UploadCoordinator::new(
            Arc::clone(&self.executor),
            UploadSettings::from(&self.config),
            Arc::clone(&self.logger),
        );

        let result: Result<()> = async {
            coordinator.run(plan, &template).await?;
            self.restore(&restore_cmd, destination).await
        }
        .await;

        if self.config.cleanup {
            self.cleanup(&cleanup_cmd).await;
        }

        result.map(|()| CopyReport {
            token: template.token().to_string(),
            bytes_read: encoded.source_len,
            encoded_len: encoded.payload.len(),
            chunks,
            elapsed: started.elapsed(),
        })
    }

    fn check_length(&self, what: &str, command: &str) -> Result<()> {
        let ceiling = self.config.command_length_ceiling;
        if command.len() >= ceiling {
            return Err(CopyError::Config(format!(
                "{what} command is {} bytes, command length ceiling is {ceiling}",
                command.len()
            )));
        }
        Ok(())
    }

    async fn restore(&self, command: &str, destination: &str) -> Result<()> {
        let out = self.executor.run(command).await?;
        if !out.success() {
            return Err(CopyError::Assembly {
                destination: destination.to_string(),
                code: out.exit_code,
                stderr: out.stderr_lossy(),
            });
        }
        self.logger.assembled(destination);
        Ok(())
    }

    /// Best effort; failures only reach the logger.
    async fn cleanup(&self, command: &str) {
        let err = match self.executor.run(command).await {
            Ok(out) if out.success() => return,
            Ok(out) => CopyError::Cleanup {
                code: out.exit_code,
                stderr: out.stderr_lossy(),
            },
            Err(e) => e,
        };
        self.logger.cleanup_failed(&err.to_string());
    }
}
