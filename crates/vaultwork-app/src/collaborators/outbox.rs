//! Local transport and feed poster that deliver into an outbox folder.
//!
//! Each delivered message becomes one `.md` file, so a separate mailer or
//! a person can pick it up. Nothing leaves the machine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, Utc};
use vaultwork_engine::codec;
use vaultwork_engine::{content_hash, CollaboratorError, FeedPoster, Frontmatter, Metadata, PostReceipt, Transport};

async fn deliver(dir: &Path, prefix: &str, metadata: Metadata, body: &str) -> Result<PathBuf, CollaboratorError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CollaboratorError::Unavailable(format!("{}: {e}", dir.display())))?;

    let canonical = format!("{}\n{body}", metadata.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("\n"));
    let hash = content_hash(&canonical);
    let name = format!(
        "{prefix}_{}_{}.md",
        Local::now().format("%Y%m%d%H%M%S"),
        &hash[..8]
    );
    let path = dir.join(name);

    let text = codec::serialize(&Frontmatter {
        metadata,
        body: body.to_string(),
    });
    tokio::fs::write(&path, text)
        .await
        .map_err(|e| CollaboratorError::Failed(format!("{}: {e}", path.display())))?;
    Ok(path)
}

/// Writes each email to `<outbox>/EMAIL_<timestamp>_<hash>.md`.
#[derive(Debug, Clone)]
pub struct OutboxTransport {
    dir: PathBuf,
}

impl OutboxTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Transport for OutboxTransport {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<bool, CollaboratorError> {
        let recipient = recipient.trim();
        if !recipient.contains('@') || recipient.contains(char::is_whitespace) {
            tracing::warn!(recipient = %recipient, "Refusing malformed recipient");
            return Ok(false);
        }

        let metadata: Metadata = [
            ("recipient", recipient.to_string()),
            ("subject", format!("\"{}\"", subject.replace('"', "'"))),
            ("sent_at", Utc::now().to_rfc3339()),
        ]
        .into_iter()
        .collect();
        let path = deliver(&self.dir, "EMAIL", metadata, body).await?;
        tracing::info!(recipient = %recipient, path = %path.display(), "Email written to outbox");
        Ok(true)
    }
}

/// Writes each post to `<outbox>/POST_<timestamp>_<hash>.md` and reports the
/// file as the post URL.
#[derive(Debug, Clone)]
pub struct OutboxFeedPoster {
    dir: PathBuf,
}

impl OutboxFeedPoster {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl FeedPoster for OutboxFeedPoster {
    async fn post_to_feed(&self, text: &str) -> Result<PostReceipt, CollaboratorError> {
        let metadata: Metadata = [("posted_at", Utc::now().to_rfc3339())].into_iter().collect();
        match deliver(&self.dir, "POST", metadata, text).await {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Post written to outbox");
                Ok(PostReceipt::posted(Some(format!("file://{}", path.display()))))
            }
            Err(e) => Ok(PostReceipt::failed(e.to_string())),
        }
    }
}
