//! Clinic queue desk
//!
//! Terminal front end for reception and doctor dashboards.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use clinic_queue::models::{DoctorId, IntakeForm, QueueSnapshot, TokenId};
use clinic_queue::notify::Severity;
use clinic_queue::ui::{format_eta, DoctorDashboard, DoctorRoster, ReceptionDesk};
use clinic_queue::{config, ClinicContext};

#[derive(Parser)]
#[command(name = "clinic-queue", about = "Clinic queue desk: intake, doctor queues, live dashboards")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List doctors and their availability
    Doctors,
    /// Add an available doctor
    AddDoctor { name: String },
    /// Set a doctor available (true) or offline (false)
    Availability {
        doctor_id: DoctorId,
        #[arg(action = ArgAction::Set)]
        available: bool,
    },
    /// Register a patient and place them in a doctor's queue
    Intake {
        #[arg(long)]
        doctor: Option<DoctorId>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: Option<u32>,
        #[arg(long)]
        contact: String,
    },
    /// Show a doctor's waiting list
    Waiting { doctor_id: DoctorId },
    /// Follow a doctor's queue live until Ctrl-C
    Watch { doctor_id: DoctorId },
    /// Call the next waiting patient
    CallNext { doctor_id: DoctorId },
    /// Mark a token served
    Served { doctor_id: DoctorId, token_id: TokenId },
    /// Mark a token absent
    Absent { doctor_id: DoctorId, token_id: TokenId },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = config::load_config().context("Failed to load configuration")?;
    let ctx = ClinicContext::from_config(&config).context("Failed to build queue client")?;

    let outcome = run(&ctx, cli.command).await;
    print_notification(&ctx);
    outcome
}

async fn run(ctx: &ClinicContext, command: Commands) -> Result<()> {
    match command {
        Commands::Doctors => {
            for doctor in DoctorRoster::new(ctx).load().await {
                let state = if doctor.available { "available" } else { "offline" };
                println!("{:>4}  {:<24} {}", doctor.id, doctor.name, state);
            }
        }
        Commands::AddDoctor { name } => {
            let doctor = DoctorRoster::new(ctx).create(&name).await?;
            println!("Doctor {} created with id {}", doctor.name, doctor.id);
        }
        Commands::Availability { doctor_id, available } => {
            DoctorRoster::new(ctx).set_availability(doctor_id, available).await?;
        }
        Commands::Intake {
            doctor,
            name,
            age,
            contact,
        } => {
            let mut desk = ReceptionDesk::new(ctx);
            desk.select_doctor(doctor).await;
            desk.form = IntakeForm::new(name, age, contact);
            let token = desk.submit().await?;
            println!("Token #{} issued", token.token_number);
            print_waiting(&desk);
        }
        Commands::Waiting { doctor_id } => {
            let mut desk = ReceptionDesk::new(ctx);
            desk.select_doctor(Some(doctor_id)).await;
            print_waiting(&desk);
        }
        Commands::Watch { doctor_id } => watch(ctx, doctor_id).await?,
        Commands::CallNext { doctor_id } => {
            let dashboard = DoctorDashboard::mount(ctx, doctor_id).await;
            let token = dashboard.call_next().await?;
            println!("Calling #{}", token.token_number);
            print_snapshot(doctor_id, &dashboard.snapshot());
        }
        Commands::Served { doctor_id, token_id } => {
            let dashboard = DoctorDashboard::mount(ctx, doctor_id).await;
            dashboard.mark_served(token_id).await?;
            print_snapshot(doctor_id, &dashboard.snapshot());
        }
        Commands::Absent { doctor_id, token_id } => {
            let dashboard = DoctorDashboard::mount(ctx, doctor_id).await;
            dashboard.mark_absent(token_id).await?;
            print_snapshot(doctor_id, &dashboard.snapshot());
        }
    }
    Ok(())
}

async fn watch(ctx: &ClinicContext, doctor_id: DoctorId) -> Result<()> {
    let dashboard = DoctorDashboard::mount(ctx, doctor_id).await;
    let mut changes = dashboard.changes();
    let mut connection = dashboard.connection_changes();
    let mut notifications = ctx.notifier.feed();
    print_snapshot(doctor_id, &dashboard.snapshot());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = changes.borrow_and_update().clone().unwrap_or_default();
                print_snapshot(doctor_id, &snapshot);
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *connection.borrow_and_update();
                eprintln!("[push channel: {status:?}]");
            }
            Ok(note) = notifications.recv() => {
                eprintln!("[{:?}] {}", note.severity, note.message);
            }
        }
    }

    dashboard.unmount();
    Ok(())
}

fn print_notification(ctx: &ClinicContext) {
    if let Some(note) = ctx.notifier.current() {
        match note.severity {
            Severity::Success => println!("{}", note.message),
            Severity::Error => eprintln!("{}", note.message),
        }
    }
}

fn print_waiting(desk: &ReceptionDesk) {
    let waiting = desk.waiting();
    if waiting.is_empty() {
        println!("No waiting patients");
    }
    for entry in waiting {
        println!(
            "  #{:<4} {:<24} pos {:<3} eta {}",
            entry.token_number,
            entry.patient_name,
            entry.position,
            format_eta(Some(entry.eta_seconds))
        );
    }
}

fn print_snapshot(doctor_id: DoctorId, snapshot: &QueueSnapshot) {
    println!(
        "Doctor {doctor_id}: {} waiting, {} pending, {} completed",
        snapshot.waiting.len(),
        snapshot.pending.len(),
        snapshot.completed.len()
    );
    for entry in &snapshot.waiting {
        println!(
            "  waiting  #{:<4} {:<24} pos {:<3} eta {}",
            entry.token_number,
            entry.patient_name,
            entry.position,
            format_eta(Some(entry.eta_seconds))
        );
    }
    for token in &snapshot.pending {
        println!("  called   #{:<4} {}", token.token_number, token.patient_name().unwrap_or("-"));
    }
    for token in &snapshot.completed {
        let served = token
            .service_seconds
            .map(|s| format!("{s}s"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  done     #{:<4} {:<24} {}",
            token.token_number,
            token.patient_name().unwrap_or("-"),
            served
        );
    }
}
