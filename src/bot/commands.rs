use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
  /// Open the shop and the main menu
  Start,
  /// Show your balance and top-up options
  Balance,
  /// Show the help text
  Help,
}
