use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use nme_core::{
    followup::{claims_due_for_review, colombia_today, record_filing},
    intake::{parse_colombian_date, TutelaField},
    requirements::validate_escalation_requirements,
    rules::{decide_next_escalation, decide_next_escalation_on},
    ClaimKind, ClaimRecord, CoreConfig, EscalationOrchestrator, FileClaimStore,
    PatientClaimStore, PatientKey,
};

#[derive(Parser)]
#[command(name = "nme")]
#[command(about = "No Me Entregaron claims escalation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the rule engine decision for a risk category and claim history
    Decide {
        /// Risk category: simple, priorizado or vital
        category: String,
        /// JSON file with the claim history (array of claim records)
        #[arg(long)]
        history: Option<PathBuf>,
        /// Apply the same-day guard as of this date (YYYY-MM-DD)
        #[arg(long)]
        today: Option<String>,
    },
    /// Run an automatic escalation for a session
    Escalate {
        /// Session id of the prescription
        session_id: String,
    },
    /// Check whether a claim kind may be drafted for a patient
    Validate {
        /// Patient key, e.g. COCC39287966
        patient_key: String,
        /// Claim kind: eps, supersalud, tutela or desacato
        kind: String,
    },
    /// Record the filing number of a claim
    RecordFiling {
        patient_key: String,
        claim_id: String,
        /// Filing number issued by the entity
        numero: String,
        /// Filing date (YYYY-MM-DD or DD/MM/YYYY)
        fecha: String,
    },
    /// List filed claims due for review
    DueReviews {
        /// Review date (YYYY-MM-DD), defaults to today in Colombia
        #[arg(long)]
        date: Option<String>,
    },
    /// List all patients
    List,
    /// Print the question used to collect a tutela field
    TutelaPrompt {
        /// numero_sentencia, fecha_sentencia, fecha_radicacion_tutela, juzgado or ciudad
        field: String,
    },
}

fn file_store() -> Result<Arc<FileClaimStore>, Box<dyn std::error::Error>> {
    let cfg = Arc::new(CoreConfig::from_env()?);
    Ok(Arc::new(FileClaimStore::new(cfg)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Decide {
            category,
            history,
            today,
        }) => {
            let claims: Vec<ClaimRecord> = match history {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => Vec::new(),
            };
            let decision = match today {
                Some(raw) => {
                    let today = parse_colombian_date(&raw).ok_or("invalid --today date")?;
                    decide_next_escalation_on(&category, &claims, today)
                }
                None => decide_next_escalation(&category, &claims),
            };
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Some(Commands::Escalate { session_id }) => {
            let cfg = Arc::new(CoreConfig::from_env()?);
            let store = Arc::new(FileClaimStore::new(cfg.clone()));
            let orchestrator = EscalationOrchestrator::from_config(cfg, store)?;
            match orchestrator.auto_escalate(&session_id) {
                Ok(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
                Err(e) => eprintln!("Error escalating session {}: {}", session_id, e),
            }
        }
        Some(Commands::Validate { patient_key, kind }) => {
            let key = PatientKey::parse(&patient_key)?;
            let kind: ClaimKind = kind.parse()?;
            let store = file_store()?;
            match validate_escalation_requirements(store.as_ref(), &key, kind) {
                Ok(report) if report.can_escalate => println!("{}: allowed", report.kind),
                Ok(report) => println!(
                    "{}: blocked ({}) - {}",
                    report.kind,
                    report.missing.join(", "),
                    report.reason
                ),
                Err(e) => eprintln!("Error validating {}: {}", key, e),
            }
        }
        Some(Commands::RecordFiling {
            patient_key,
            claim_id,
            numero,
            fecha,
        }) => {
            let key = PatientKey::parse(&patient_key)?;
            let claim_id = uuid::Uuid::parse_str(&claim_id)?;
            let fecha = parse_colombian_date(&fecha).ok_or("invalid filing date")?;
            let store = file_store()?;
            match record_filing(store.as_ref(), &key, claim_id, &numero, fecha) {
                Ok(claim) => println!(
                    "Filed claim {} as {}, review on {}",
                    claim.id_reclamacion,
                    claim.numero_radicado,
                    claim
                        .fecha_revision
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".into())
                ),
                Err(e) => eprintln!("Error recording filing: {}", e),
            }
        }
        Some(Commands::DueReviews { date }) => {
            let today = match date {
                Some(raw) => parse_colombian_date(&raw).ok_or("invalid --date")?,
                None => colombia_today(),
            };
            let store = file_store()?;
            let due = claims_due_for_review(store.as_ref(), today)?;
            if due.is_empty() {
                println!("No claims due for review on {}.", today);
            }
            for review in due {
                println!(
                    "{} {} level {} radicado {} due {} (claim {})",
                    review.patient_key,
                    review.tipo_accion,
                    review.nivel_escalamiento,
                    review.numero_radicado,
                    review.fecha_revision,
                    review.claim_id
                );
            }
        }
        Some(Commands::List) => {
            let store = file_store()?;
            let patients = store.list_patients()?;
            if patients.is_empty() {
                println!("No patients found.");
            } else {
                for key in patients {
                    let level = store
                        .get_patient(&key)?
                        .map(|p| p.nivel_actual)
                        .unwrap_or_default();
                    println!("Key: {}, Level: {}", key, level);
                }
            }
        }
        Some(Commands::TutelaPrompt { field }) => {
            let field: TutelaField = field.parse()?;
            println!("{}", field.prompt());
        }
        None => {
            println!("Use 'nme --help' for commands");
        }
    }

    Ok(())
}
