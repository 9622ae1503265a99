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

//! Construction of the candidate class set the optimizer chooses from.
//!
//! Depending on the `possibilita_abertura_novas_turmas` parameter the
//! candidate set is either synthesized from student demand (enough rooms per
//! (school, grade) pair to cover everyone at the configured capacity) or
//! taken verbatim from the current class catalog. In both cases every class
//! gets a deterministic human-readable name built from its region, grade and
//! room letter.

use std::collections::{BTreeMap, HashMap};

use log::warn;

use crate::io::dataset::Dataset;
use crate::{CandidateClass, Parameters, Student};

/// Room letters by room ordinal; the bounded alphabet limits a
/// (school, grade) pair to four rooms
const ROOM_LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Build the candidate class set for the given student populations.
///
/// With `possibilita_abertura_novas_turmas` set, demand is counted per
/// (school, planning-year grade) pair over both populations and
/// `ceil(demand / qtd_max_alunos)` rooms are emitted per pair, with dense
/// 1-based class ids in ascending (school, grade) order. Pairs below
/// `min_aluno_por_turma` are skipped. Otherwise the current class catalog is
/// returned unchanged, ordered by class id.
///
/// # Errors
///
/// Fails with a string error message if a school, region or grade referenced
/// by a class is missing from the lookup tables (the class could not be
/// named), or if the existing catalog holds more classes per (school, grade)
/// pair than the room alphabet can name.
pub fn build_candidate_classes(
    data: &Dataset,
    params: &Parameters,
    enrolled: &[Student],
    waitlisted: &[Student],
) -> Result<Vec<CandidateClass>, String> {
    let names = NameLookups::new(data);

    if params.possibilita_abertura_novas_turmas {
        synthesize_from_demand(params, enrolled, waitlisted, &names)
    } else {
        catalog_passthrough(data, &names)
    }
}

/// Emit enough rooms per (school, grade) pair to cover the counted demand
fn synthesize_from_demand(
    params: &Parameters,
    enrolled: &[Student],
    waitlisted: &[Student],
    names: &NameLookups,
) -> Result<Vec<CandidateClass>, String> {
    let mut demand: BTreeMap<(u32, u32), u32> = BTreeMap::new();
    for student in enrolled.iter().chain(waitlisted.iter()) {
        *demand
            .entry((student.school_id, student.new_grade_id))
            .or_insert(0) += 1;
    }

    let mut classes = Vec::new();
    for (&(school_id, grade_id), &count) in demand.iter() {
        if let Some(minimum) = params.min_aluno_por_turma {
            if count < minimum {
                continue;
            }
        }
        let rooms_needed = ((count + params.qtd_max_alunos - 1) / params.qtd_max_alunos) as usize;
        if rooms_needed > ROOM_LETTERS.len() {
            warn!(
                "Demand of {} students at school {}, grade {} needs {} rooms, but only {} fit \
                 the naming scheme. Emitting {} rooms.",
                count,
                school_id,
                grade_id,
                rooms_needed,
                ROOM_LETTERS.len(),
                ROOM_LETTERS.len()
            );
        }
        for room in 1..=rooms_needed.min(ROOM_LETTERS.len()) {
            classes.push(CandidateClass {
                class_id: classes.len() as u32 + 1,
                school_id,
                grade_id,
                name: names.class_name(school_id, grade_id, room)?,
            });
        }
    }

    Ok(classes)
}

/// Return the current class catalog unchanged, with room ordinals assigned
/// in id order within each (school, grade) pair for naming
fn catalog_passthrough(data: &Dataset, names: &NameLookups) -> Result<Vec<CandidateClass>, String> {
    let mut rows: Vec<_> = data.turma.iter().collect();
    rows.sort_by_key(|t| t.id);

    let mut rooms_per_pair: BTreeMap<(u32, u32), usize> = BTreeMap::new();
    let mut classes = Vec::new();
    for turma in rows {
        let room = rooms_per_pair
            .entry((turma.escola_id, turma.serie_id))
            .or_insert(0);
        *room += 1;
        if *room > ROOM_LETTERS.len() {
            return Err(format!(
                "School {}, grade {} has more than {} classes in the catalog; the naming scheme \
                 cannot label class {}.",
                turma.escola_id,
                turma.serie_id,
                ROOM_LETTERS.len(),
                turma.id
            ));
        }
        classes.push(CandidateClass {
            class_id: turma.id,
            school_id: turma.escola_id,
            grade_id: turma.serie_id,
            name: names.class_name(turma.escola_id, turma.serie_id, *room)?,
        });
    }

    Ok(classes)
}

/// Lookup tables for deriving class names
struct NameLookups<'a> {
    region_of_school: HashMap<u32, u32>,
    region_names: HashMap<u32, &'a str>,
    grade_names: HashMap<u32, Option<&'a str>>,
}

impl<'a> NameLookups<'a> {
    fn new(data: &'a Dataset) -> Self {
        NameLookups {
            region_of_school: data.escola.iter().map(|e| (e.id, e.regiao_id)).collect(),
            region_names: data.regiao.iter().map(|r| (r.id, r.nome.as_str())).collect(),
            grade_names: data
                .serie
                .iter()
                .map(|s| (s.id, s.nome.as_deref()))
                .collect(),
        }
    }

    /// Class name: region name, underscore, first letter of the grade name
    /// and the room letter (e.g. `Norte_1A`)
    fn class_name(&self, school_id: u32, grade_id: u32, room: usize) -> Result<String, String> {
        let region_id = self
            .region_of_school
            .get(&school_id)
            .ok_or(format!("School {} not found in the 'escola' table.", school_id))?;
        let region_name = self
            .region_names
            .get(region_id)
            .ok_or(format!("Region {} not found in the 'regiao' table.", region_id))?;
        let grade_name = self
            .grade_names
            .get(&grade_id)
            .copied()
            .ok_or(format!("Grade {} not found in the 'serie' table.", grade_id))?
            .ok_or(format!("Grade {} has no name in the 'serie' table.", grade_id))?;
        let initial = grade_name
            .chars()
            .next()
            .ok_or(format!("Grade {} has an empty name.", grade_id))?;

        Ok(format!("{}_{}{}", region_name, initial, ROOM_LETTERS[room - 1]))
    }
}
