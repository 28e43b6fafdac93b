//! Yes/no confirmation before destructive operations.

use anyhow::Result;
use dialoguer::Confirm;

/// Ask `question`, defaulting to "no".
///
/// `assume_yes` skips the prompt. When stdin is not a terminal the answer is
/// "no", so scripts must pass `-y` explicitly.
pub fn confirm(question: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !atty::is(atty::Stream::Stdin) {
        eprintln!("{} [non-interactive, assuming no; pass -y to confirm]", question);
        return Ok(false);
    }
    let answer = Confirm::new()
        .with_prompt(question)
        .default(false)
        .interact()?;
    Ok(answer)
}
