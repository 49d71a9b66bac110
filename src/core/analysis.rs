//! Narrative analysis of a calibration record
//!
//! The prompt embeds the equipment spec and every group/point line with
//! its combined error; a [`NarrativeService`] turns it into free text.
//! The production implementation pipes the prompt to a user-configured
//! external command. Failures map to a fixed fallback string so the
//! record flow never depends on the service being up.

use std::io::Write;
use std::process::{Command, Stdio};

use miette::Diagnostic;
use thiserror::Error;

use crate::entities::calibration::{CalibrationRecord, MeasurementPoint};
use crate::entities::equipment::Equipment;

/// Text stored when the narrative service cannot be reached
pub const FALLBACK_ANALYSIS: &str = "Erro ao conectar com serviço de IA.";

#[derive(Debug, Error, Diagnostic)]
pub enum AnalysisError {
    #[error("no analysis command configured")]
    #[diagnostic(
        code(cmt::analysis::not_configured),
        help("set analysis_command in .cmt/config.yaml or CMT_ANALYSIS_CMD")
    )]
    NotConfigured,

    #[error("failed to run analysis command")]
    Io(#[from] std::io::Error),

    #[error("analysis command exited with {0}")]
    CommandFailed(std::process::ExitStatus),
}

/// External text generation over a formatted prompt
pub trait NarrativeService {
    fn generate(&self, prompt: &str) -> Result<String, AnalysisError>;
}

/// Pipes the prompt to a shell command's stdin and reads the narrative
/// from its stdout
pub struct CommandNarrative {
    command: String,
}

impl CommandNarrative {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl NarrativeService for CommandNarrative {
    fn generate(&self, prompt: &str) -> Result<String, AnalysisError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(AnalysisError::CommandFailed(output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Generate the narrative, mapping any failure to [`FALLBACK_ANALYSIS`]
pub fn generate_or_fallback(service: &dyn NarrativeService, prompt: &str) -> String {
    service
        .generate(prompt)
        .unwrap_or_else(|_| FALLBACK_ANALYSIS.to_string())
}

fn point_line(point: &MeasurementPoint) -> String {
    format!(
        "- Padrão: {}, Medido: {}, Erro: {}, Incerteza: {}, Erro Combinado (√(E²+U²)): {:.4}",
        point.reference_value,
        point.measured_value,
        point.error,
        point.uncertainty,
        point.combined_error()
    )
}

/// Render the analysis prompt for a record
pub fn build_prompt(equipment: &Equipment, record: &CalibrationRecord) -> String {
    let measurements_text = if !record.measurement_groups.is_empty() {
        record
            .measurement_groups
            .iter()
            .map(|group| {
                let lines: Vec<String> = group.measurements.iter().map(point_line).collect();
                format!("GRUPO DE TESTE: {}\n{}", group.name, lines.join("\n"))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    } else {
        // records that never gained groups
        record
            .measurements
            .iter()
            .map(point_line)
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "VOCÊ É UMA INTELIGÊNCIA ARTIFICIAL (IA) DE UM SISTEMA DE METROLOGIA.\n\
         NÃO atue como engenheiro, técnico ou humano. NÃO use primeira pessoa (ex: \"Eu analisei\", \"Minha opinião\").\n\
         \n\
         Analise os dados de calibração abaixo de forma técnica e impessoal:\n\
         \n\
         Equipamento: {} ({} {})\n\
         Tag: {}\n\
         Exatidão/Critério: {}\n\
         Resolução: {}\n\
         \n\
         Dados da Calibração:\n\
         Data: {}\n\
         Temperatura: {}°C\n\
         Umidade: {}%\n\
         \n\
         Medições (Padrão vs Medido):\n\
         {}\n\
         \n\
         INSTRUÇÕES OBRIGATÓRIAS:\n\
         1. Analise se o 'Erro Combinado' ultrapassa os critérios de exatidão (se informados) EM CADA GRUPO DE TESTE.\n\
         2. Forneça um parecer técnico objetivo indicando conformidade ou não.\n\
         3. O TEXTO DEVE INICIAR EXATAMENTE COM: \"PARECER GERADO POR IA:\".\n\
         4. Use frases impessoais como \"A análise indica...\", \"Observa-se que...\", \"Os resultados demonstram...\".\n\
         5. Se houver múltiplos grupos (ex: Tração e Compressão), cite especificamente qual passou ou falhou.\n\
         \n\
         Responda em Português do Brasil.\n",
        equipment.name,
        equipment.manufacturer,
        equipment.model,
        equipment.tag,
        equipment.accuracy,
        equipment.resolution,
        record.date,
        record.temperature,
        record.humidity,
        measurements_text
    )
}

/// Store the narrative on the record and append it to the notes
pub fn with_analysis(record: &CalibrationRecord, analysis: &str) -> CalibrationRecord {
    let mut next = record.clone();
    next.ai_analysis = Some(analysis.to_string());
    next.notes = if next.notes.is_empty() {
        analysis.to_string()
    } else {
        format!("{}\n\n{}", next.notes, analysis)
    };
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::calibration::PointUpdate;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct CannedNarrative(Option<String>);

    impl NarrativeService for CannedNarrative {
        fn generate(&self, _prompt: &str) -> Result<String, AnalysisError> {
            self.0.clone().ok_or(AnalysisError::NotConfigured)
        }
    }

    fn sample_record() -> (Equipment, CalibrationRecord) {
        let mut eq = Equipment::new("MU-01", "Máquina Universal", date(2026, 1, 1));
        eq.manufacturer = "Instron".to_string();
        eq.accuracy = "±0.5 %FE".to_string();

        let record =
            CalibrationRecord::new(eq.id.as_str(), "Ana", date(2025, 3, 10)).add_group_named("Tração");
        let g = record.measurement_groups[0].id.clone();
        let record = record.add_point(&g).unwrap();
        let p = record.measurement_groups[0].measurements[0].id.clone();
        let record = record
            .update_point(
                &g,
                &p,
                PointUpdate {
                    reference_value: Some(100.0),
                    measured_value: Some(100.03),
                    uncertainty: Some(0.04),
                },
            )
            .unwrap();
        (eq, record)
    }

    #[test]
    fn test_prompt_carries_groups_and_combined_error() {
        let (eq, record) = sample_record();
        let prompt = build_prompt(&eq, &record);

        assert!(prompt.contains("Tag: MU-01"));
        assert!(prompt.contains("Exatidão/Critério: ±0.5 %FE"));
        assert!(prompt.contains("GRUPO DE TESTE: Tração"));
        // √(0.03² + 0.04²) = 0.05
        assert!(prompt.contains("Erro Combinado (√(E²+U²)): 0.0500"));
        assert!(prompt.contains("PARECER GERADO POR IA:"));
    }

    #[test]
    fn test_prompt_falls_back_to_flat_measurements() {
        let (eq, _) = sample_record();
        let mut record = CalibrationRecord::new(eq.id.as_str(), "Ana", date(2024, 1, 5));
        record.measurements = vec![Default::default()];

        let prompt = build_prompt(&eq, &record);
        assert!(!prompt.contains("GRUPO DE TESTE:"));
        assert!(prompt.contains("- Padrão: 0, Medido: 0"));
    }

    #[test]
    fn test_with_analysis_appends_to_notes() {
        let (_, record) = sample_record();
        let analyzed = with_analysis(&record, "PARECER GERADO POR IA: conforme.");
        assert_eq!(analyzed.notes, "PARECER GERADO POR IA: conforme.");
        assert_eq!(
            analyzed.ai_analysis.as_deref(),
            Some("PARECER GERADO POR IA: conforme.")
        );

        let mut noted = record.clone();
        noted.notes = "Parecer técnico.".to_string();
        let analyzed = with_analysis(&noted, "PARECER GERADO POR IA: conforme.");
        assert_eq!(
            analyzed.notes,
            "Parecer técnico.\n\nPARECER GERADO POR IA: conforme."
        );
    }

    #[test]
    fn test_failure_maps_to_fallback() {
        let down = CannedNarrative(None);
        assert_eq!(generate_or_fallback(&down, "prompt"), FALLBACK_ANALYSIS);

        let up = CannedNarrative(Some("PARECER GERADO POR IA: ok.".to_string()));
        assert_eq!(generate_or_fallback(&up, "prompt"), "PARECER GERADO POR IA: ok.");
    }
}
