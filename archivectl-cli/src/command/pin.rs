use archivectl::catalog::PinSelector;
use archivectl::command::Command;

/// Parse a pin selector: `newest`, `oldest`, `pinned` (unpin only), `+k`
/// for the k most recent, or a bare integer for a specific backup id.
pub fn parse_pin_selector(s: &str) -> Result<PinSelector, String> {
    match s {
        "newest" => Ok(PinSelector::Newest),
        "oldest" => Ok(PinSelector::Oldest),
        "pinned" => Ok(PinSelector::Pinned),
        s if s.starts_with('+') => s[1..]
            .parse()
            .map(PinSelector::Count)
            .map_err(|_| format!("{s:?} is not a valid +count selector")),
        s => s.parse().map(PinSelector::ById).map_err(|_| format!("{s:?} is not a valid backup id")),
    }
}

#[derive(clap::Args, Debug)]
pub struct PinArgs {
    pub archive: String,
    /// `newest`, `oldest`, `+k`, or a backup id.
    #[clap(value_parser = parse_pin_selector)]
    pub selector: PinSelector,
}

#[derive(clap::Args, Debug)]
pub struct UnpinArgs {
    pub archive: String,
    /// `newest`, `oldest`, `pinned`, `+k`, or a backup id.
    #[clap(value_parser = parse_pin_selector)]
    pub selector: PinSelector,
}

impl PinArgs {
    #[must_use]
    pub fn into_command(self) -> Command {
        Command::Pin { archive: self.archive, selector: self.selector }
    }
}

impl UnpinArgs {
    #[must_use]
    pub fn into_command(self) -> Command {
        Command::Unpin { archive: self.archive, selector: self.selector }
    }
}
