use anyhow::{Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Generate,
    Retag,
    DeleteAll,
    Quit,
}

pub const MENU: &str = "\n[Menu]\n1. Generate new cases\n2. Update subjects and types for existing cases\n3. Delete all cases\nQ. Quit";
pub const CHOICE_PROMPT: &str = "\nEnter your choice (1/2/3/Q): ";
pub const COUNT_PROMPT: &str = "Enter the number of cases to generate: ";

pub fn parse_choice(line: &str) -> Result<MenuChoice> {
    let trimmed = line.trim();
    match trimmed {
        "1" => Ok(MenuChoice::Generate),
        "2" => Ok(MenuChoice::Retag),
        "3" => Ok(MenuChoice::DeleteAll),
        _ if trimmed.eq_ignore_ascii_case("q") => Ok(MenuChoice::Quit),
        "" => bail!("empty input"),
        other => bail!("invalid choice: {other}"),
    }
}

pub fn parse_case_count(line: &str) -> Result<usize> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        bail!("a number of cases is required");
    }
    let count: usize = trimmed
        .parse()
        .map_err(|_| anyhow::anyhow!("not a whole number: {trimmed}"))?;
    Ok(count)
}
