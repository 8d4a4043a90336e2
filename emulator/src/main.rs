mod session;

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Color as TermColor, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute, queue};
use ranger_core::LoopStatus;
use ranger_core::display::{Cell, Color, GRID_COLUMNS, GRID_ROWS};
use ranger_core::input::Key;

use session::{DISTANCE_STEP_CM, LOG_PANE_LINES, Session, SessionOptions};

const USAGE: &str = "Usage: ranger-emulator [--store <path>] [--log <path>] [--battery <percent>] \
                     [--drain <percent-per-sample>] [--distance <cm|none>]";

const HELP: &str = "keys: 1 bright  2 lowBattery  3 lang  ` escape  ;/. up/down  ,// left/right \
                    (arrows too)  +/- move object  n no echo  b/B battery -/+5  q quit";

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let mut session = Session::new(&options)?;
    let mut stdout = io::stdout();

    terminal::enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;
    let result = run(&mut session, &mut stdout);
    execute!(stdout, ResetColor, cursor::Show, LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;

    if session.power_off_requested() {
        println!("Low battery: device powered off.");
    }
    result
}

enum Action {
    Quit,
    Key(Key),
    Continue,
}

fn run(session: &mut Session, out: &mut impl Write) -> io::Result<()> {
    loop {
        if session.step()? == LoopStatus::Halted {
            draw(session, out)?;
            queue!(
                out,
                cursor::MoveTo(0, footer_row() + 1),
                SetForegroundColor(TermColor::Red),
                Print("powered off, press any key to exit"),
                ResetColor
            )?;
            out.flush()?;
            wait_for_any_key()?;
            return Ok(());
        }

        draw(session, out)?;

        if event::poll(session.idle_yield())? {
            match handle_event(session, event::read()?) {
                Action::Quit => return Ok(()),
                Action::Key(key) => session.press(key),
                Action::Continue => {}
            }
        }
    }
}

fn handle_event(session: &mut Session, event: Event) -> Action {
    let Event::Key(KeyEvent {
        code,
        modifiers,
        kind,
        ..
    }) = event
    else {
        return Action::Continue;
    };
    if kind == KeyEventKind::Release {
        return Action::Continue;
    }

    match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Char('+') => {
            session.nudge_distance(DISTANCE_STEP_CM);
            Action::Continue
        }
        KeyCode::Char('-') => {
            session.nudge_distance(-DISTANCE_STEP_CM);
            Action::Continue
        }
        KeyCode::Char('n') => {
            session.toggle_object(SessionOptions::default().distance_cm.unwrap_or(42.0));
            Action::Continue
        }
        KeyCode::Char('b') => {
            let level = session.battery_level();
            session.set_battery_level(level - 5.0);
            Action::Continue
        }
        KeyCode::Char('B') => {
            let level = session.battery_level();
            session.set_battery_level(level + 5.0);
            Action::Continue
        }
        KeyCode::Esc => Action::Key(Key::Escape),
        KeyCode::Up => Action::Key(Key::UP),
        KeyCode::Down => Action::Key(Key::DOWN),
        KeyCode::Left => Action::Key(Key::LEFT),
        KeyCode::Right => Action::Key(Key::RIGHT),
        KeyCode::Char(ch) => Key::from_char(ch).map_or(Action::Continue, Action::Key),
        _ => Action::Continue,
    }
}

fn wait_for_any_key() -> io::Result<()> {
    loop {
        if let Event::Key(KeyEvent { kind, .. }) = event::read()?
            && kind != KeyEventKind::Release
        {
            return Ok(());
        }
    }
}

const fn term_color(color: Color) -> TermColor {
    match color {
        Color::Black => TermColor::Black,
        Color::White => TermColor::White,
        Color::SkyBlue => TermColor::Cyan,
        Color::Green => TermColor::Green,
        Color::Orange => TermColor::DarkYellow,
        Color::Red => TermColor::Red,
    }
}

const FRAME_LEFT: u16 = 1;
const FRAME_TOP: u16 = 1;

fn footer_row() -> u16 {
    FRAME_TOP + u16::from(GRID_ROWS) + 2
}

fn draw(session: &mut Session, out: &mut impl Write) -> io::Result<()> {
    let border = "-".repeat(usize::from(GRID_COLUMNS));
    queue!(
        out,
        cursor::MoveTo(FRAME_LEFT - 1, FRAME_TOP - 1),
        Print(format!("+{border}+"))
    )?;

    let grid = session.grid();
    for row in 0..GRID_ROWS {
        queue!(
            out,
            cursor::MoveTo(FRAME_LEFT - 1, FRAME_TOP + u16::from(row)),
            Print("|")
        )?;
        for cell in grid.row_cells(row) {
            if cell.glyph == Cell::CONTINUATION {
                continue;
            }
            queue!(out, SetForegroundColor(term_color(cell.color)), Print(cell.glyph))?;
        }
        queue!(out, ResetColor, Print("|"))?;
    }
    queue!(
        out,
        cursor::MoveTo(FRAME_LEFT - 1, FRAME_TOP + u16::from(GRID_ROWS)),
        Print(format!("+{border}+"))
    )?;

    let object = session
        .sensor()
        .distance_cm()
        .map_or_else(|| "none".to_string(), |cm| format!("{cm:.1} cm"));
    let backlight = session.grid().brightness();
    let battery = session.battery_level();
    let status = format!(
        "object {object:<10} battery {battery:>5.1}%  backlight {backlight:>3}/255  triggers {}",
        session.sensor().fired()
    );
    queue!(
        out,
        cursor::MoveTo(0, footer_row()),
        terminal::Clear(terminal::ClearType::CurrentLine),
        Print(status),
        cursor::MoveTo(0, footer_row() + 2),
        terminal::Clear(terminal::ClearType::CurrentLine),
        Print(HELP)
    )?;

    let log_top = footer_row() + 4;
    let lines: Vec<String> = session.log_lines().map(str::to_string).collect();
    for slot in 0..LOG_PANE_LINES {
        let row = log_top + u16::try_from(slot).unwrap_or(u16::MAX);
        queue!(
            out,
            cursor::MoveTo(0, row),
            terminal::Clear(terminal::ClearType::CurrentLine)
        )?;
        if let Some(line) = lines.get(slot) {
            queue!(out, Print(line))?;
        }
    }
    out.flush()
}

fn parse_options() -> Result<SessionOptions, String> {
    parse_args(env::args().skip(1))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<SessionOptions, String> {
    let mut options = SessionOptions::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };
        match flag.as_str() {
            "--store" => options.store_path = Some(PathBuf::from(value()?)),
            "--log" => options.log_path = Some(PathBuf::from(value()?)),
            "--battery" => options.battery_percent = parse_number(&flag, &value()?)?,
            "--drain" => options.drain_per_sample = parse_number(&flag, &value()?)?,
            "--distance" => {
                let raw = value()?;
                options.distance_cm = if raw.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(parse_number(&flag, &raw)?)
                };
            }
            "--help" | "-h" => return Err(HELP.to_string()),
            other => return Err(format!("Unknown argument {other}")),
        }
    }
    Ok(options)
}

fn parse_number(flag: &str, raw: &str) -> Result<f32, String> {
    raw.parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| format!("Invalid number for {flag}: {raw}"))
}
