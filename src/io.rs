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

pub mod dataset;

use std::fmt::Write;

use crate::{Allocation, CandidateClass, Population, Student};

/// Format the calculated allocation into a human readable String (e.g. to
/// print it to stdout).
///
/// The output format will look like
/// ```text
/// ===== Norte_1A =====
/// (2 students)
/// - matriculado 17
/// - formulario 3
///
/// ===== Norte_1B =====
/// …
/// ```
///
/// Candidate classes that stay closed are not listed.
pub fn format_allocation(
    allocation: &Allocation,
    classes: &[CandidateClass],
    enrolled: &[Student],
    waitlisted: &[Student],
) -> String {
    let mut result = String::new();
    for (class, opened) in classes.iter().zip(allocation.opened.iter()) {
        if !opened {
            continue;
        }
        write!(result, "\n===== {} =====\n", class.name).unwrap();
        let placed: Vec<&Student> = waitlisted
            .iter()
            .zip(allocation.waitlisted.iter())
            .chain(enrolled.iter().zip(allocation.enrolled.iter()))
            .filter(|(_, placement)| **placement == Some(class.class_id))
            .map(|(student, _)| student)
            .collect();
        writeln!(result, "({} students)", placed.len()).unwrap();

        for student in placed {
            writeln!(result, "- {} {}", student.population.tag(), student.id).unwrap();
        }
    }

    result
}

pub fn debug_list_of_classes(classes: &[CandidateClass]) -> String {
    classes
        .iter()
        .map(|c| format!("{:02} {}", c.class_id, c.name))
        .collect::<Vec<String>>()
        .join("\n")
}

/// Assert that the loaded student/class data structures are consistent (in
/// terms of sequence positions, cohort tags and candidate class ordering)
pub fn assert_data_consistency(
    enrolled: &[Student],
    waitlisted: &[Student],
    classes: &[CandidateClass],
) {
    for (i, s) in enrolled.iter().enumerate() {
        assert_eq!(i, s.index, "Index of {}. enrolled student is {}", i, s.index);
        assert_eq!(
            s.population,
            Population::Enrolled,
            "Student {} in the enrolled sequence is tagged {}",
            s.id,
            s.population.tag()
        );
        assert!(
            s.cluster > 0,
            "Enrolled student {} has no cluster tag",
            s.id
        );
        assert_eq!(
            s.priority_weight, 1.0,
            "Enrolled student {} has priority weight {}",
            s.id, s.priority_weight
        );
    }
    for (i, s) in waitlisted.iter().enumerate() {
        assert_eq!(
            i, s.index,
            "Index of {}. waitlisted student is {}",
            i, s.index
        );
        assert_eq!(
            s.population,
            Population::Waitlisted,
            "Student {} in the waitlisted sequence is tagged {}",
            s.id,
            s.population.tag()
        );
        assert_eq!(s.cluster, 0, "Waitlisted student {} has a cluster tag", s.id);
        assert!(
            s.enrollment_date.is_some(),
            "Waitlisted student {} has no enrollment date",
            s.id
        );
        assert!(
            s.priority_weight > 0.0 && s.priority_weight <= 1.0,
            "Priority weight {} of waitlisted student {} is out of range",
            s.priority_weight,
            s.id
        );
    }
    for pair in classes.windows(2) {
        assert!(
            pair[0].class_id < pair[1].class_id,
            "Candidate class ids {} and {} are not ascending",
            pair[0].class_id,
            pair[1].class_id
        );
    }
    for c in classes.iter() {
        assert!(!c.name.is_empty(), "Class {} has an empty name", c.class_id);
    }
}

#[cfg(test)]
mod tests {
    use crate::{Allocation, CandidateClass, Population, Student};

    #[test]
    fn test_format_allocation() {
        let classes = vec![
            CandidateClass {
                class_id: 1,
                school_id: 1,
                grade_id: 1,
                name: String::from("Norte_1A"),
            },
            CandidateClass {
                class_id: 2,
                school_id: 1,
                grade_id: 1,
                name: String::from("Norte_1B"),
            },
        ];
        let enrolled = vec![Student {
            index: 0,
            id: 17,
            population: Population::Enrolled,
            school_id: 1,
            new_grade_id: 1,
            cluster: 3,
            enrollment_date: None,
            priority_weight: 1.0,
        }];
        let waitlisted = vec![Student {
            index: 0,
            id: 3,
            population: Population::Waitlisted,
            school_id: 1,
            new_grade_id: 1,
            cluster: 0,
            enrollment_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 1),
            priority_weight: 1.0,
        }];
        let allocation = Allocation {
            enrolled: vec![Some(1)],
            waitlisted: vec![Some(1)],
            opened: vec![true, false],
            objective: 0.0,
        };

        let formatted = super::format_allocation(&allocation, &classes, &enrolled, &waitlisted);
        assert!(formatted.contains("===== Norte_1A ====="));
        assert!(formatted.contains("(2 students)"));
        assert!(formatted.contains("- matriculado 17"));
        assert!(formatted.contains("- formulario 3"));
        // The second class stays closed and is not listed
        assert!(!formatted.contains("Norte_1B"));
    }
}
