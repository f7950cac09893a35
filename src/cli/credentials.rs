//! Interactive credential entry.

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::cli::chat::read_line;
use crate::cli::CliContext;
use crate::core::credentials::{CredentialField, CredentialForm, CredentialSubmitError};

pub async fn run_credentials(context: &mut CliContext, server_id: &str) -> Result<(), Box<dyn Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    if let Some(message) = collect_and_submit(context, server_id, &mut lines).await? {
        println!("✅ {message}");
    }
    Ok(())
}

/// Fetch the server's requirements, prompt for each field, and submit.
///
/// Missing required values are asked for again until filled in. Returns
/// `None` when input ends before the form is complete.
pub async fn collect_and_submit<R>(
    context: &CliContext,
    server_id: &str,
    lines: &mut Lines<R>,
) -> Result<Option<String>, Box<dyn Error>>
where
    R: AsyncBufRead + Unpin,
{
    let mut form = context
        .client
        .credential_form(&context.session, server_id)
        .await?;

    if form.fields.is_empty() {
        return Ok(Some(format!("{} needs no credentials", form.display_name())));
    }

    println!("Credentials for {}:", form.display_name());
    let mut stdout = io::stdout();
    let mut only_invalid = false;
    loop {
        if !prompt_fields(&mut form, lines, &mut stdout, only_invalid).await? {
            return Ok(None);
        }

        match context.client.submit_credentials(&context.session, &mut form).await {
            Ok(message) => {
                return Ok(Some(
                    message.unwrap_or_else(|| format!("Saved credentials for {}", form.display_name())),
                ))
            }
            Err(CredentialSubmitError::Invalid(err)) => {
                eprintln!("⚠️  {err}");
                only_invalid = true;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn field_prompt(field: &CredentialField) -> String {
    let mut prompt = field.label().to_string();
    if let Some(placeholder) = field.requirement.placeholder.as_deref() {
        prompt.push_str(&format!(" [{placeholder}]"));
    }
    if field.requirement.secret {
        prompt.push_str(" (secret, shown as typed)");
    }
    if !field.requirement.required {
        prompt.push_str(" (optional)");
    }
    prompt.push_str(": ");
    prompt
}

/// Prompt for every field, or only the ones flagged invalid. Returns `false`
/// at end of input.
pub(crate) async fn prompt_fields<R, W>(
    form: &mut CredentialForm,
    lines: &mut Lines<R>,
    out: &mut W,
    only_invalid: bool,
) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    for index in 0..form.fields.len() {
        let field = &form.fields[index];
        if only_invalid && !field.invalid {
            continue;
        }
        if let Some(description) = field.requirement.description.as_deref() {
            writeln!(out, "  {description}")?;
        }
        write!(out, "{}", field_prompt(field))?;
        out.flush()?;

        let Some(value) = read_line(lines).await? else {
            return Ok(false);
        };
        let name = field.name().to_string();
        form.set(&name, value);
    }
    Ok(true)
}
