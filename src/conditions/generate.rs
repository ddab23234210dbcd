//! Story splicing: turns one template into the row for one condition.
//!
//! The template story is five `.`-separated sentences: setting, desire,
//! percept, initial belief, causal event. Which of them survive depends on
//! the variable and on whether the initial belief is shown.

use anyhow::{Result, ensure};

use crate::conditions::types::{
    ConditionKey, ConditionRow, InitialBelief, Subject, TruthCondition, Variable,
};
use crate::template::StoryTemplate;

/// Sentence indices kept for the story, and for the prefix of the control
/// story (which swaps the causal event for the random one).
fn sentence_plan(variable: Variable, init_belief: InitialBelief) -> (&'static [usize], &'static [usize]) {
    match (variable, init_belief) {
        (Variable::BackwardDesire, InitialBelief::Hidden) => (&[0, 2, 4], &[0, 2]),
        (Variable::BackwardDesire, InitialBelief::Shown) => (&[0, 2, 3, 4], &[0, 2, 3]),
        (Variable::PerceptToBelief, _) => (&[0, 1, 2], &[]),
        (_, InitialBelief::Hidden) => (&[0, 1, 2, 4], &[0, 1, 2]),
        (_, InitialBelief::Shown) => (&[0, 1, 2, 3, 4], &[0, 1, 2, 3]),
    }
}

fn fragments<'a>(story: &'a str, needed: &[usize]) -> Result<Vec<&'a str>> {
    let parts: Vec<&str> = story.split('.').collect();
    let max = needed.iter().copied().max().unwrap_or(0);
    ensure!(
        parts.len() > max,
        "story has {} sentence fragments, needs at least {}: {:?}",
        parts.len(),
        max + 1,
        story
    );
    Ok(parts)
}

/// `p0.p1.p4.` for picks `[0, 1, 4]`.
fn sentences(parts: &[&str], picks: &[usize]) -> String {
    picks.iter().map(|&i| format!("{}.", parts[i])).collect()
}

/// The picked fragments re-joined with `.`, then the random event.
fn control_story(parts: &[&str], picks: &[usize], random_event: &str) -> String {
    let mut pieces: Vec<String> = picks.iter().map(|&i| parts[i].to_string()).collect();
    pieces.push(format!(" {random_event}"));
    pieces.join(".")
}

fn spliced(base: &str, clauses: &[&str]) -> String {
    let mut text = base.to_string();
    for clause in clauses {
        text.push(' ');
        text.push_str(clause);
    }
    text
}

fn question_and_answers(template: &StoryTemplate, subject: Subject) -> (&str, &str, &str) {
    match subject {
        Subject::Belief => (
            template.belief_question.as_str(),
            template.belief_answer_aware.as_str(),
            template.belief_answer_not_aware.as_str(),
        ),
        Subject::Desire => (
            template.desire_question.as_str(),
            template.desire_answer_aware.as_str(),
            template.desire_answer_not_aware.as_str(),
        ),
        Subject::Action => (
            template.action_question.as_str(),
            template.action_answer_aware.as_str(),
            template.action_answer_not_aware.as_str(),
        ),
    }
}

fn row(story: String, question: &str, correct: &str, incorrect: &str) -> ConditionRow {
    ConditionRow {
        story,
        question: question.to_string(),
        correct_answer: correct.to_string(),
        incorrect_answer: incorrect.to_string(),
    }
}

/// Builds the row `template` contributes to `key`, or `None` when the cell
/// gets no row from it (percept-to-belief outside its single cell, or a
/// desire question whose two answers are identical).
pub fn generate_row(template: &StoryTemplate, key: ConditionKey) -> Result<Option<ConditionRow>> {
    let ConditionKey {
        init_belief,
        variable,
        condition,
    } = key;

    if !key.is_generated() {
        return Ok(None);
    }

    let (question, aware, unaware) = question_and_answers(template, variable.subject());

    // Identical desire answers make the item unanswerable; such templates
    // are left out of every desire condition.
    if variable == Variable::BackwardDesire && aware == unaware {
        return Ok(None);
    }

    let (story_picks, control_picks) = sentence_plan(variable, init_belief);
    let parts = fragments(template.story.as_str(), story_picks)?;
    let story = sentences(&parts, story_picks);

    if variable == Variable::PerceptToBelief {
        return Ok(Some(row(story, question, aware, unaware)));
    }

    let control = control_story(&parts, control_picks, template.random_event.as_str());

    let generated = match condition {
        TruthCondition::TrueBelief => {
            let text = match variable {
                Variable::BackwardDesire => spliced(
                    &story,
                    &[template.aware_of_event.as_str(), template.action_aware.as_str()],
                ),
                Variable::BackwardBelief => spliced(&story, &[template.action_aware.as_str()]),
                _ => spliced(&story, &[template.aware_of_event.as_str()]),
            };
            row(text, question, aware, unaware)
        }
        TruthCondition::FalseBelief => {
            let text = match variable {
                Variable::BackwardDesire => spliced(
                    &story,
                    &[template.not_aware_of_event.as_str(), template.action_not_aware.as_str()],
                ),
                Variable::BackwardBelief => spliced(&story, &[template.action_not_aware.as_str()]),
                _ => spliced(&story, &[template.not_aware_of_event.as_str()]),
            };
            row(text, question, unaware, aware)
        }
        TruthCondition::TrueControl | TruthCondition::FalseControl => {
            let percept = if condition == TruthCondition::TrueControl {
                template.aware_of_random_event.as_str()
            } else {
                template.not_aware_of_random_event.as_str()
            };
            let text = match variable {
                Variable::BackwardDesire => {
                    spliced(&control, &[percept, template.action_not_aware.as_str()])
                }
                Variable::BackwardBelief => spliced(&control, &[template.action_not_aware.as_str()]),
                _ => spliced(&control, &[percept]),
            };
            // The random event never changes the protagonist's mind.
            row(text, question, unaware, aware)
        }
    };

    Ok(Some(generated))
}
