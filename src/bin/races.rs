use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use laptime_tracker::{config::Config, leaderboard::Leaderboard, logging, store::Store};
use std::env;
use tracing::info;

const USAGE: &str = "usage: races <command> [args]
  list                               active races
  archived                           archived races
  create <name> <YYYY-MM-DD>         add a race
  archive <race_id>
  remove <race_id>                   delete a race and everything recorded for it
  drivers <race_id>
  add-driver <race_id> <name> <car>
  update-driver <driver_id> <name> <car>
  change-driver <race_id> <car> <driver_id>
  cars <race_id>                     car numbers seen in a race
  board <race_id>                    print the leaderboard";

fn arg<T: std::str::FromStr>(args: &[String], i: usize, what: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = args
        .get(i)
        .with_context(|| format!("missing <{}>\n{}", what, USAGE))?;
    raw.parse()
        .with_context(|| format!("invalid <{}>: {:?}", what, raw))
}

fn main() -> Result<()> {
    logging::init("warn");

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(cmd) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load()?;
    let store = Store::open(&config.database_path)?;

    match cmd.as_str() {
        "list" | "archived" => {
            let races = if cmd == "list" {
                store.races()?
            } else {
                store.archived_races()?
            };
            for r in races {
                println!("{:>4}  {}  {}", r.id, r.date, r.name);
            }
        }
        "create" => {
            let name: String = arg(&args, 1, "name")?;
            let date: NaiveDate = arg(&args, 2, "date")?;
            let id = store.create_race(&name, date)?;
            println!("{}", id);
        }
        "archive" => {
            let id: i64 = arg(&args, 1, "race_id")?;
            if !store.archive_race(id)? {
                bail!("race {} not found", id);
            }
        }
        "remove" => {
            let id: i64 = arg(&args, 1, "race_id")?;
            if !store.remove_race(id)? {
                bail!("race {} not found", id);
            }
        }
        "drivers" => {
            let id: i64 = arg(&args, 1, "race_id")?;
            for d in store.drivers(id)? {
                println!("{:>4}  car {:>4}  {}", d.id, d.car_number, d.name);
            }
        }
        "add-driver" => {
            let race: i64 = arg(&args, 1, "race_id")?;
            let name: String = arg(&args, 2, "name")?;
            let car: u32 = arg(&args, 3, "car")?;
            println!("{}", store.create_driver(race, &name, car)?);
        }
        "update-driver" => {
            let id: i64 = arg(&args, 1, "driver_id")?;
            let name: String = arg(&args, 2, "name")?;
            let car: u32 = arg(&args, 3, "car")?;
            if !store.update_driver(id, &name, car)? {
                bail!("driver {} not found", id);
            }
        }
        "change-driver" => {
            let race: i64 = arg(&args, 1, "race_id")?;
            let car: u32 = arg(&args, 2, "car")?;
            let driver: i64 = arg(&args, 3, "driver_id")?;
            let id = store.create_driver_change(race, car, driver, Utc::now())?;
            info!(race, car, driver, change = id, "driver change recorded");
        }
        "cars" => {
            let id: i64 = arg(&args, 1, "race_id")?;
            println!("{:?}", store.car_numbers(id)?);
        }
        "board" => {
            let id: i64 = arg(&args, 1, "race_id")?;
            print!("{}", Leaderboard::load(&store, id)?.render());
        }
        other => bail!("unknown command {:?}\n{}", other, USAGE),
    }
    Ok(())
}
