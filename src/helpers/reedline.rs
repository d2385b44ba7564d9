use clap_repl::reedline::{
    self, DefaultPrompt, DefaultPromptSegment, EditMode, Reedline, ReedlineEvent, Signal, Vi,
    default_vi_insert_keybindings, default_vi_normal_keybindings,
};
use colored::*;
use eyre::{Result, eyre};

fn prompt(prompt: &str) -> DefaultPrompt {
    DefaultPrompt::new(
        DefaultPromptSegment::Basic(prompt.to_owned()),
        DefaultPromptSegment::Empty,
    )
}

/// Read lines until an empty one, joined with newlines. A pasted
/// `deposit_data-*.json` may span many lines.
pub fn read_until_blank(prompt_str: &str) -> Result<String> {
    let mut rl = Reedline::create();
    let mut text = String::new();
    let mut next_prompt = prompt(prompt_str);
    loop {
        match rl.read_line(&next_prompt)? {
            Signal::Success(line) if line.trim().is_empty() => return Ok(text),
            Signal::Success(line) => {
                text.push_str(&line);
                text.push('\n');
            }
            _ => return Err(eyre!("Cancelled")),
        }
        next_prompt = prompt("");
    }
}

pub fn read_password(prompt: &str) -> Result<String> {
    print!("{}", prompt.green());
    use termion::input::TermRead;
    let mut stdout = std::io::stdout().lock();
    let mut stdin = std::io::stdin().lock();
    match stdin.read_passwd(&mut stdout)? {
        Some(password) => Ok(password),
        None => Err(eyre!("Cancelled")),
    }
}

/// True only if the user typed `expected` (case insensitive)
pub fn confirm(prompt_str: &str, expected: &str) -> Result<bool> {
    let mut rl = Reedline::create();
    match rl.read_line(&prompt(prompt_str))? {
        Signal::Success(x) => Ok(x.trim().eq_ignore_ascii_case(expected)),
        _ => Err(eyre!("Cancelled")),
    }
}

pub fn edit_mode_vi() -> Box<dyn EditMode> {
    let mut insert_keybinds = default_vi_insert_keybindings();
    insert_keybinds.add_binding(
        reedline::KeyModifiers::NONE,
        reedline::KeyCode::Tab,
        ReedlineEvent::UntilFound(vec![
            ReedlineEvent::Menu("completion_menu".to_string()),
            ReedlineEvent::MenuNext,
        ]),
    );
    Box::new(Vi::new(insert_keybinds, default_vi_normal_keybindings()))
}
