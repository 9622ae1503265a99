// Copyright 2024 by the alocador developers
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except in compliance with
// the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! IO functionality for the table documents exchanged with the NGO's
//! database.
//!
//! The input is a JSON export of the relevant tables: one object with an
//! array of row objects per table, column names as in the database. The
//! output is a JSON document with the three solution tables
//! (`sol_aluno`, `sol_priorizacao_formulario`, `sol_turma`), replaced as a
//! whole on every run and written empty when the model has no solution.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{Allocation, CandidateClass, Parameters, Student};

/// Row of the `parametro` table. The value is kept as raw JSON so that both
/// numeric and string-encoded integers can be coerced later.
#[derive(Clone, Debug, Deserialize)]
pub struct ParametroRow {
    pub chave: String,
    pub valor: serde_json::Value,
}

/// Contact columns carried opaquely from the student tables into the
/// solution tables
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub cpf: Option<String>,
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub email_aluno: Option<String>,
    #[serde(default)]
    pub telefone_aluno: Option<String>,
    #[serde(default)]
    pub nome_responsavel: Option<String>,
    #[serde(default)]
    pub telefone_responsavel: Option<String>,
    #[serde(default)]
    pub nome_escola_origem: Option<String>,
}

/// Row of the `aluno` table (currently enrolled students)
#[derive(Clone, Debug, Deserialize)]
pub struct AlunoRow {
    pub id: u32,
    #[serde(default)]
    pub turma_id: Option<u32>,
    #[serde(default)]
    pub reprova: i64,
    #[serde(default)]
    pub continua: i64,
    #[serde(flatten)]
    pub contato: ContactInfo,
}

/// Row of the `formulario_inscricao` table (waiting-list applicants)
#[derive(Clone, Debug, Deserialize)]
pub struct FormularioRow {
    pub id: u32,
    pub escola_id: u32,
    pub serie_id: u32,
    /// Submission date as dd/mm/yyyy; applicants without one are dropped
    #[serde(default)]
    pub data_inscricao: Option<String>,
    pub ano_referencia: i64,
    #[serde(flatten)]
    pub contato: ContactInfo,
}

/// Row of the `serie` table (grades)
#[derive(Clone, Debug, Deserialize)]
pub struct SerieRow {
    pub id: u32,
    #[serde(default)]
    pub nome: Option<String>,
    pub ativa: i64,
}

/// Row of the `turma` table (current class catalog)
#[derive(Clone, Debug, Deserialize)]
pub struct TurmaRow {
    pub id: u32,
    pub escola_id: u32,
    pub serie_id: u32,
}

/// Row of the `escola` table (schools)
#[derive(Clone, Debug, Deserialize)]
pub struct EscolaRow {
    pub id: u32,
    pub regiao_id: u32,
}

/// Row of the `regiao` table (regions)
#[derive(Clone, Debug, Deserialize)]
pub struct RegiaoRow {
    pub id: u32,
    pub nome: String,
}

/// The full set of input tables consumed by one allocation run
#[derive(Debug)]
pub struct Dataset {
    pub parametro: Vec<ParametroRow>,
    pub aluno: Vec<AlunoRow>,
    pub formulario_inscricao: Vec<FormularioRow>,
    pub serie: Vec<SerieRow>,
    pub turma: Vec<TurmaRow>,
    pub escola: Vec<EscolaRow>,
    pub regiao: Vec<RegiaoRow>,
}

/// Read the input tables from a JSON table document.
///
/// # Errors
///
/// Fails with a string error message to be displayed to the user, if
/// * the document has invalid JSON syntax,
/// * one of the seven tables is missing, or
/// * a row misses a required column or holds a value of the wrong type.
///
/// Unknown tables and columns are ignored.
pub fn read<R: std::io::Read>(reader: R) -> Result<Dataset, String> {
    let mut data: serde_json::Value =
        serde_json::from_reader(reader).map_err(|err| err.to_string())?;

    Ok(Dataset {
        parametro: take_table(&mut data, "parametro")?,
        aluno: take_table(&mut data, "aluno")?,
        formulario_inscricao: take_table(&mut data, "formulario_inscricao")?,
        serie: take_table(&mut data, "serie")?,
        turma: take_table(&mut data, "turma")?,
        escola: take_table(&mut data, "escola")?,
        regiao: take_table(&mut data, "regiao")?,
    })
}

/// Extract and deserialize one table's rows from the parsed document
fn take_table<T: serde::de::DeserializeOwned>(
    data: &mut serde_json::Value,
    name: &str,
) -> Result<Vec<T>, String> {
    let table = data
        .get_mut(name)
        .ok_or(format!("No '{}' table found in data.", name))?;
    serde_json::from_value(table.take()).map_err(|e| format!("Table '{}': {}", name, e))
}

/// Row of the `sol_aluno` output table (placed enrolled students)
#[derive(Debug, Serialize)]
pub struct SolAlunoRow {
    pub id: u32,
    #[serde(flatten)]
    pub contato: ContactInfo,
    pub turma_id: u32,
}

/// Row of the `sol_priorizacao_formulario` output table (placed waiting-list
/// applicants, in submission order)
#[derive(Debug, Serialize)]
pub struct SolFormularioRow {
    pub id: u32,
    #[serde(flatten)]
    pub contato: ContactInfo,
    pub turma_id: u32,
    pub status_id: Option<u32>,
}

/// Row of the `sol_turma` output table (opened classes)
#[derive(Debug, Serialize)]
pub struct SolTurmaRow {
    pub turma_id: u32,
    pub nome: String,
    pub escola_id: u32,
    pub serie_id: u32,
    pub qtd_alunos: u32,
    pub qtd_max_alunos: u32,
    pub qtd_professores_acd: u32,
    pub qtd_professores_pedagogico: u32,
    pub aprova: Option<bool>,
}

/// The three solution tables written back to the database
#[derive(Debug, Serialize)]
pub struct SolutionTables {
    pub sol_aluno: Vec<SolAlunoRow>,
    pub sol_priorizacao_formulario: Vec<SolFormularioRow>,
    pub sol_turma: Vec<SolTurmaRow>,
}

impl SolutionTables {
    /// Empty tables, written when the model has no solution
    pub fn empty() -> Self {
        SolutionTables {
            sol_aluno: Vec::new(),
            sol_priorizacao_formulario: Vec::new(),
            sol_turma: Vec::new(),
        }
    }
}

/// Assemble the solution tables from a successful allocation.
///
/// Contact columns are joined back from the input rows by student id. The
/// `sol_aluno` rows are ordered by student id, the
/// `sol_priorizacao_formulario` rows by the original submission date and the
/// `sol_turma` rows by class id.
pub fn solution_tables(
    data: &Dataset,
    params: &Parameters,
    enrolled: &[Student],
    waitlisted: &[Student],
    classes: &[CandidateClass],
    allocation: &Allocation,
) -> SolutionTables {
    let aluno_by_id: HashMap<u32, &AlunoRow> = data.aluno.iter().map(|r| (r.id, r)).collect();
    let formulario_by_id: HashMap<u32, &FormularioRow> =
        data.formulario_inscricao.iter().map(|r| (r.id, r)).collect();

    let mut sol_aluno = Vec::new();
    for (student, placement) in enrolled.iter().zip(allocation.enrolled.iter()) {
        if let (Some(turma_id), Some(row)) = (placement, aluno_by_id.get(&student.id)) {
            sol_aluno.push(SolAlunoRow {
                id: student.id,
                contato: row.contato.clone(),
                turma_id: *turma_id,
            });
        }
    }

    let mut placed_applicants: Vec<(NaiveDate, &Student, u32)> = Vec::new();
    for (student, placement) in waitlisted.iter().zip(allocation.waitlisted.iter()) {
        if let (Some(turma_id), Some(date)) = (placement, student.enrollment_date) {
            placed_applicants.push((date, student, *turma_id));
        }
    }
    placed_applicants.sort_by_key(|(date, student, _)| (*date, student.id));
    let sol_priorizacao_formulario = placed_applicants
        .into_iter()
        .filter_map(|(_, student, turma_id)| {
            formulario_by_id.get(&student.id).map(|row| SolFormularioRow {
                id: student.id,
                contato: row.contato.clone(),
                turma_id,
                status_id: None,
            })
        })
        .collect();

    let mut sol_turma = Vec::new();
    for (class, opened) in classes.iter().zip(allocation.opened.iter()) {
        if !opened {
            continue;
        }
        sol_turma.push(SolTurmaRow {
            turma_id: class.class_id,
            nome: class.name.clone(),
            escola_id: class.school_id,
            serie_id: class.grade_id,
            qtd_alunos: allocation.class_size(class.class_id) as u32,
            qtd_max_alunos: params.qtd_max_alunos,
            qtd_professores_acd: params.qtd_professores_acd,
            qtd_professores_pedagogico: params.qtd_professores_pedagogico,
            aprova: None,
        });
    }

    SolutionTables {
        sol_aluno,
        sol_priorizacao_formulario,
        sol_turma,
    }
}

/// Write the solution tables as a JSON document to a Writer (e.g. an output
/// file). All three tables are replaced as a whole.
pub fn write<W: std::io::Write>(writer: W, tables: &SolutionTables) -> Result<(), String> {
    let data = json!({
        "sol_aluno": tables.sol_aluno,
        "sol_priorizacao_formulario": tables.sol_priorizacao_formulario,
        "sol_turma": tables.sol_turma,
    });
    serde_json::to_writer(writer, &data).map_err(|e| format!("{}", e))?;

    Ok(())
}
