//! First-run configuration bootstrapping.
//!
//! Kept out of the serving path entirely: `chatrelay init` prompts on stdin
//! and writes the YAML config file that `chatrelay serve` consumes. The
//! server itself never blocks on console input.

use std::path::Path;

use anyhow::{Context, bail};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};

use crate::llm::ProviderKind;

pub async fn run(path: &Path) -> anyhow::Result<()> {
    if fs::try_exists(path).await? {
        bail!(
            "config file {} already exists; edit it directly or remove it first",
            path.display()
        );
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let auth_token = prompt(&mut input, "Enter the API authorization token clients must present: ").await?;
    if auth_token.is_empty() {
        bail!("an authorization token is required");
    }

    let default_provider = loop {
        let answer = prompt(
            &mut input,
            "Default provider (openai | groq | ollama) [openai]: ",
        )
        .await?;
        if answer.is_empty() {
            break ProviderKind::OpenAI;
        }
        match answer.parse::<ProviderKind>() {
            Ok(kind) => break kind,
            Err(e) => eprintln!("{e}"),
        }
    };

    let openai_key = prompt(&mut input, "OpenAI API key (blank to skip): ").await?;
    let groq_key = prompt(&mut input, "Groq API key (blank to skip): ").await?;

    let contents = render_config(&auth_token, default_provider, &openai_key, &groq_key);
    fs::write(path, contents)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    println!("Wrote {}.", path.display());
    println!(
        "CHATRELAY_AUTH_TOKEN, OPENAI_API_KEY, and GROQ_API_KEY override these values at startup."
    );
    Ok(())
}

async fn prompt(
    input: &mut tokio::io::Lines<BufReader<Stdin>>,
    label: &str,
) -> anyhow::Result<String> {
    let mut out = tokio::io::stdout();
    out.write_all(label.as_bytes()).await?;
    out.flush().await?;
    Ok(input
        .next_line()
        .await?
        .unwrap_or_default()
        .trim()
        .to_string())
}

fn render_config(
    auth_token: &str,
    default_provider: ProviderKind,
    openai_key: &str,
    groq_key: &str,
) -> String {
    let mut contents = format!(
        "auth_token: {}\ndefault_provider: {default_provider}\n",
        yaml_quote(auth_token)
    );
    if !openai_key.is_empty() || !groq_key.is_empty() {
        contents.push_str("providers:\n");
        if !openai_key.is_empty() {
            contents.push_str(&format!(
                "  openai:\n    api_key: {}\n",
                yaml_quote(openai_key)
            ));
        }
        if !groq_key.is_empty() {
            contents.push_str(&format!("  groq:\n    api_key: {}\n", yaml_quote(groq_key)));
        }
    }
    contents
}

/// Double-quote a YAML scalar, escaping the characters that would break out
/// of the quotes.
fn yaml_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
