use std::path::Path;

use bagel_contracts::{
    split_thinking, CaptionOptions, EditImageOptions, FileRef, JobOutcome, JobRequest, Operation,
    SessionToken, TextToImageOptions,
};

use crate::client::BagelClient;
use crate::error::{BagelError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ImageResult {
    pub image_url: String,
    pub session: SessionToken,
    pub event_id: Option<String>,
    pub upload: Option<FileRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionResult {
    pub think: Option<String>,
    pub text: String,
    pub session: SessionToken,
    pub event_id: Option<String>,
    pub upload: FileRef,
}

impl BagelClient {
    pub async fn text_to_image(
        &self,
        prompt: &str,
        options: &TextToImageOptions,
    ) -> Result<ImageResult> {
        let operation = Operation::TextToImage;
        let session = SessionToken::generate();
        let request = JobRequest::new(options.job_args(prompt), operation.fn_index(), session);
        let outcome = self.run_job(&request).await?;
        image_result(operation, request.session_hash, outcome, None)
    }

    /// Uploads `image` first; the job is only submitted once the server has
    /// confirmed the upload.
    pub async fn edit_image(
        &self,
        image: &Path,
        prompt: &str,
        options: &EditImageOptions,
    ) -> Result<ImageResult> {
        let operation = Operation::EditImage;
        let upload = self.upload_file(image).await?;
        let request = JobRequest::new(
            options.job_args(upload.clone(), prompt),
            operation.fn_index(),
            SessionToken::generate(),
        );
        let outcome = self.run_job(&request).await?;
        image_result(operation, request.session_hash, outcome, Some(upload))
    }

    pub async fn caption_image(
        &self,
        image: &Path,
        prompt: &str,
        options: &CaptionOptions,
    ) -> Result<CaptionResult> {
        let operation = Operation::CaptionImage;
        let upload = self.upload_file(image).await?;
        let request = JobRequest::new(
            options.job_args(upload.clone(), prompt),
            operation.fn_index(),
            SessionToken::generate(),
        );
        let outcome = self.run_job(&request).await?;
        let Some(text) = outcome.output.as_ref().and_then(|asset| asset.text()) else {
            return Err(no_output(operation, &outcome, "no text received"));
        };
        let split = split_thinking(text);
        Ok(CaptionResult {
            think: split.think,
            text: split.text,
            session: request.session_hash,
            event_id: outcome.event_id,
            upload,
        })
    }
}

fn image_result(
    operation: Operation,
    session: SessionToken,
    outcome: JobOutcome,
    upload: Option<FileRef>,
) -> Result<ImageResult> {
    let Some(image_url) = outcome.output_url.clone() else {
        return Err(no_output(operation, &outcome, "no image URL received"));
    };
    Ok(ImageResult {
        image_url,
        session,
        event_id: outcome.event_id,
        upload,
    })
}

fn no_output(operation: Operation, outcome: &JobOutcome, detail: &str) -> BagelError {
    let detail = match outcome.error.as_deref() {
        Some(server_error) => format!("{detail} (server error: {server_error})"),
        None => detail.to_string(),
    };
    BagelError::NoOutput {
        operation: operation.name(),
        detail,
    }
}
