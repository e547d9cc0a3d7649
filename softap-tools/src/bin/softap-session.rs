//! Walks a full soft AP session against the in-memory mock driver: start, interface up, one
//! client association and departure, then idle auto-shutdown.

use std::io::stdout;
use std::thread;
use std::time::Duration;
use clap::Parser;
use log::LevelFilter;
use mock_driver_lib::mock_driver::MockDriver;
use softap_manager_lib::capability::{FEATURE_ACS_OFFLOAD, FEATURE_CLIENT_FORCE_DISCONNECT, SoftApCapability};
use softap_manager_lib::config::{ApBand, SoftApConfiguration, SoftApModeConfiguration, TargetMode};
use softap_manager_lib::config_store::InMemoryConfigStore;
use softap_manager_lib::events::SoftApEvent;
use softap_manager_lib::manager::SoftApManager;
use softap_manager_lib::metrics::NoopMetrics;

const CLIENT_MAC: &str = "02:12:34:56:78:9a";

#[derive(Parser, Debug)]
struct Args {
  /// SSID to broadcast
  #[arg(short, long, default_value = "mock-softap")]
  ssid: String,

  /// Radio band (2ghz, 5ghz, 6ghz, any)
  #[arg(long, default_value = "2ghz", value_parser = band_parser)]
  band: ApBand,

  /// Idle time before the AP shuts itself down
  #[arg(long, default_value_t = 1500)]
  timeout_ms: u64,
}

fn band_parser(s: &str) -> Result<ApBand, String> {
  match s {
    "2ghz" => Ok(ApBand::Band2Ghz),
    "5ghz" => Ok(ApBand::Band5Ghz),
    "6ghz" => Ok(ApBand::Band6Ghz),
    "any" => Ok(ApBand::Any),
    other => Err(format!("Unknown band: {other}")),
  }
}

fn main() -> anyhow::Result<()> {
  env_logger::builder().filter_level(LevelFilter::Info).parse_default_env().init();
  let args = Args::parse();

  let config = SoftApConfiguration::with_ssid(&args.ssid)
      .set_band(args.band)
      .set_auto_shutdown(true, Duration::from_millis(args.timeout_ms));
  let capability = SoftApCapability::new(
      FEATURE_ACS_OFFLOAD | FEATURE_CLIENT_FORCE_DISCONNECT, 8);

  let (driver, driver_control) = MockDriver::new();
  let manager = SoftApManager::new(
      Box::new(driver),
      Box::new(InMemoryConfigStore::new()),
      Box::new(NoopMetrics),
      "US",
      SoftApModeConfiguration {
        target_mode: TargetMode::Tethered,
        config: Some(config),
        capability,
      });
  let (control, events, runner) = manager.into_runner();

  let run_thread = thread::Builder::new()
      .name("SoftApManager".into())
      .spawn(move || runner.run_loop())
      .unwrap();

  control.start();
  loop {
    let event = events.rx().recv_timeout(Duration::from_secs(10))?;
    println!("event: {event:?}");
    match event {
      SoftApEvent::StateBroadcast(broadcast) => {
        if let (softap_manager_lib::ap_state::ApState::Enabling, Some(iface)) =
            (broadcast.new_state, broadcast.data_interface) {
          // The driver reports the interface coming up asynchronously; simulate it.
          driver_control.raise_interface_up(&iface);
        }
      }
      SoftApEvent::Started => {
        println!("--- AP is up, dumping manager state ---");
        control.dump(&mut stdout())?;
        let iface = driver_control.created_ifaces().remove(0);
        driver_control.raise_channel_switched(&iface, 2437, 2);
        driver_control.raise_client_changed(&iface, CLIENT_MAC, true);
      }
      SoftApEvent::ConnectedClientsChanged(clients) if !clients.is_empty() => {
        println!("--- client associated, kicking it loose so the idle timer can run ---");
        let iface = driver_control.created_ifaces().remove(0);
        driver_control.raise_client_changed(&iface, CLIENT_MAC, false);
      }
      SoftApEvent::Stopped => {
        println!("--- AP shut itself down after the idle timeout ---");
        break;
      }
      _ => {}
    }
  }

  drop(control);
  run_thread.join().unwrap()?;
  Ok(())
}
