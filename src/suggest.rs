use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::models::{EducationStage, Gender, Learner, StudySession, Subject};
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AgeAppropriate,
    LearningStyle,
    Schedule,
    AttentionImprovement,
    SubjectSpecific,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::AgeAppropriate,
        Category::LearningStyle,
        Category::Schedule,
        Category::AttentionImprovement,
        Category::SubjectSpecific,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Category::AgeAppropriate => "Age-Appropriate Recommendations",
            Category::LearningStyle => "Learning Style Suggestions",
            Category::Schedule => "Schedule Optimization",
            Category::AttentionImprovement => "Attention Improvement Tips",
            Category::SubjectSpecific => "Subject-Specific Advice",
        }
    }
}

/// Every category is present; categories no rule fired for hold an empty list.
pub type Suggestions = BTreeMap<Category, Vec<String>>;

/// Snapshot of what the rules are allowed to look at.
struct RuleContext<'a> {
    learner: &'a Learner,
    total_sessions: usize,
    mean_attention: Option<f64>,
    best_hour: Option<u32>,
    focus: Option<SubjectFocus<'a>>,
}

struct SubjectFocus<'a> {
    subject: &'a Subject,
    mean: f64,
    strongest_other: Option<(&'a Subject, f64)>,
}

/// A predicate and the messages it contributes. Templates may reference
/// `{subject}` and `{strongest}`.
struct Rule {
    when: fn(&RuleContext) -> bool,
    emits: &'static [(Category, &'static str)],
}

/// Rules within a group are mutually exclusive: the first match fires.
struct RuleGroup {
    name: &'static str,
    rules: &'static [Rule],
}

fn always(_: &RuleContext) -> bool {
    true
}

fn young_elementary(ctx: &RuleContext) -> bool {
    ctx.learner.education_stage == EducationStage::Elementary && ctx.learner.age <= 8
}

fn elementary(ctx: &RuleContext) -> bool {
    ctx.learner.education_stage == EducationStage::Elementary
}

fn middle(ctx: &RuleContext) -> bool {
    ctx.learner.education_stage == EducationStage::Middle
}

fn high(ctx: &RuleContext) -> bool {
    ctx.learner.education_stage == EducationStage::High
}

fn female(ctx: &RuleContext) -> bool {
    ctx.learner.gender == Gender::Female
}

fn male(ctx: &RuleContext) -> bool {
    ctx.learner.gender == Gender::Male
}

fn attention_low(ctx: &RuleContext) -> bool {
    ctx.mean_attention.is_some_and(|m| m < 1.5)
}

fn attention_mid(ctx: &RuleContext) -> bool {
    ctx.mean_attention.is_some_and(|m| (1.5..2.5).contains(&m))
}

fn attention_high(ctx: &RuleContext) -> bool {
    ctx.mean_attention.is_some_and(|m| m >= 2.5)
}

fn hour_in(ctx: &RuleContext, from: u32, to: u32) -> bool {
    ctx.best_hour.is_some_and(|h| (from..to).contains(&h))
}

fn early_morning(ctx: &RuleContext) -> bool {
    hour_in(ctx, 6, 9)
}

fn late_morning(ctx: &RuleContext) -> bool {
    hour_in(ctx, 9, 12)
}

fn afternoon(ctx: &RuleContext) -> bool {
    hour_in(ctx, 14, 17)
}

fn evening(ctx: &RuleContext) -> bool {
    hour_in(ctx, 19, 22)
}

fn has_history(ctx: &RuleContext) -> bool {
    ctx.total_sessions > 0
}

fn has_history_up_to_10(ctx: &RuleContext) -> bool {
    has_history(ctx) && ctx.learner.age <= 10
}

fn has_history_up_to_15(ctx: &RuleContext) -> bool {
    has_history(ctx) && ctx.learner.age <= 15
}

fn focus_weak(ctx: &RuleContext) -> bool {
    ctx.focus.as_ref().is_some_and(|f| f.mean < 2.0)
}

fn weak_elementary_math(ctx: &RuleContext) -> bool {
    weak_in(ctx, &Subject::Math) && elementary(ctx)
}

fn weak_math(ctx: &RuleContext) -> bool {
    weak_in(ctx, &Subject::Math)
}

fn weak_science(ctx: &RuleContext) -> bool {
    weak_in(ctx, &Subject::Science)
}

fn weak_in(ctx: &RuleContext, subject: &Subject) -> bool {
    focus_weak(ctx) && ctx.focus.as_ref().is_some_and(|f| f.subject == subject)
}

fn focus_strong(ctx: &RuleContext) -> bool {
    ctx.focus.as_ref().is_some_and(|f| f.mean >= 2.0)
}

fn lags_strongest_subject(ctx: &RuleContext) -> bool {
    ctx.total_sessions >= 3
        && ctx.focus.as_ref().is_some_and(|f| {
            f.strongest_other
                .is_some_and(|(_, other_mean)| other_mean - f.mean > 0.5)
        })
}

static LEARNER_GROUPS: &[RuleGroup] = &[
    RuleGroup {
        name: "pomodoro",
        rules: &[Rule {
            when: always,
            emits: &[(
                Category::AgeAppropriate,
                "Try the Pomodoro technique: 25 minutes of study followed by a 5 minute break helps sustain focus.",
            )],
        }],
    },
    RuleGroup {
        name: "age_stage",
        rules: &[
            Rule {
                when: young_elementary,
                emits: &[(
                    Category::AgeAppropriate,
                    "At this age, pair study with interactive activities and a reward system to build motivation.",
                )],
            },
            Rule {
                when: elementary,
                emits: &[(
                    Category::AgeAppropriate,
                    "Encourage choosing study topics independently to grow interest and a sense of responsibility.",
                )],
            },
            Rule {
                when: middle,
                emits: &[
                    (
                        Category::AgeAppropriate,
                        "Middle school calls for more room for self-directed study; set clear learning goals together.",
                    ),
                    (
                        Category::AgeAppropriate,
                        "This is a good time to start building time management and study planning skills.",
                    ),
                ],
            },
            Rule {
                when: high,
                emits: &[
                    (
                        Category::AgeAppropriate,
                        "High school needs stronger self-discipline; draw up a long-term study plan.",
                    ),
                    (
                        Category::AgeAppropriate,
                        "Focus on efficiency with tools such as mind maps or Cornell notes.",
                    ),
                ],
            },
        ],
    },
    RuleGroup {
        name: "style",
        rules: &[
            Rule {
                when: female,
                emits: &[(
                    Category::LearningStyle,
                    "Many learners benefit from studying with friends; a cooperative setting may help.",
                )],
            },
            Rule {
                when: male,
                emits: &[(
                    Category::LearningStyle,
                    "Many learners respond well to challenging goals; some friendly competition may boost motivation.",
                )],
            },
        ],
    },
    RuleGroup {
        name: "attention_tier",
        rules: &[
            Rule {
                when: attention_low,
                emits: &[
                    (
                        Category::AttentionImprovement,
                        "Attention is low; check the study space for distractions.",
                    ),
                    (
                        Category::AttentionImprovement,
                        "White noise or quiet music can help with concentration.",
                    ),
                    (
                        Category::Schedule,
                        "Shorten each study block to 15-20 minutes and take breaks more often.",
                    ),
                ],
            },
            Rule {
                when: attention_mid,
                emits: &[
                    (
                        Category::AttentionImprovement,
                        "Attention is moderate; five minutes of deep breathing or stretching before studying can help.",
                    ),
                    (
                        Category::Schedule,
                        "The 25 minute study block suits the current pace; keep this rhythm.",
                    ),
                ],
            },
            Rule {
                when: attention_high,
                emits: &[
                    (
                        Category::AttentionImprovement,
                        "Attention is excellent! Try more challenging material.",
                    ),
                    (
                        Category::Schedule,
                        "Study blocks can stretch to 30-35 minutes, still with regular breaks.",
                    ),
                ],
            },
        ],
    },
    RuleGroup {
        name: "time_slot",
        rules: &[
            Rule {
                when: early_morning,
                emits: &[(
                    Category::Schedule,
                    "Focus peaks in the early morning (6-9); schedule important subjects then.",
                )],
            },
            Rule {
                when: late_morning,
                emits: &[(
                    Category::Schedule,
                    "Focus peaks in the late morning (9-12); schedule important subjects then.",
                )],
            },
            Rule {
                when: afternoon,
                emits: &[(
                    Category::Schedule,
                    "Focus peaks in the afternoon (14-17); schedule important subjects then.",
                )],
            },
            Rule {
                when: evening,
                emits: &[(
                    Category::Schedule,
                    "Focus peaks in the evening (19-22); schedule important subjects then.",
                )],
            },
        ],
    },
    RuleGroup {
        name: "bedtime",
        rules: &[
            Rule {
                when: has_history_up_to_10,
                emits: &[(
                    Category::Schedule,
                    "Avoid study that demands high focus after 8 pm.",
                )],
            },
            Rule {
                when: has_history_up_to_15,
                emits: &[(
                    Category::Schedule,
                    "Finish the main study tasks before 9 pm and keep later review light.",
                )],
            },
            Rule {
                when: has_history,
                emits: &[(
                    Category::Schedule,
                    "Evening study can run a little longer at this age, but protect a full night's sleep.",
                )],
            },
        ],
    },
];

static SUBJECT_GROUPS: &[RuleGroup] = &[
    RuleGroup {
        name: "subject_performance",
        rules: &[
            Rule {
                when: weak_elementary_math,
                emits: &[(
                    Category::SubjectSpecific,
                    "{subject} needs reinforcement; math games and hands-on manipulatives can help.",
                )],
            },
            Rule {
                when: weak_math,
                emits: &[(
                    Category::SubjectSpecific,
                    "{subject} needs reinforcement; practise foundational problems to build logical reasoning.",
                )],
            },
            Rule {
                when: weak_science,
                emits: &[(
                    Category::SubjectSpecific,
                    "{subject} needs reinforcement; experiments and observation can spark interest.",
                )],
            },
            Rule {
                when: focus_weak,
                emits: &[(
                    Category::SubjectSpecific,
                    "{subject} needs reinforcement; add practice time and pin down where it gets difficult.",
                )],
            },
            Rule {
                when: focus_strong,
                emits: &[(
                    Category::SubjectSpecific,
                    "{subject} is going well; try more advanced material or use it to support other subjects.",
                )],
            },
        ],
    },
    RuleGroup {
        name: "habit_transfer",
        rules: &[Rule {
            when: lags_strongest_subject,
            emits: &[(
                Category::SubjectSpecific,
                "Attention in {strongest} is clearly higher than in {subject}; try carrying over the study habits that work in {strongest}.",
            )],
        }],
    },
];

fn render(template: &str, ctx: &RuleContext) -> String {
    match &ctx.focus {
        Some(focus) => {
            let strongest = focus
                .strongest_other
                .map(|(subject, _)| subject.display_name())
                .unwrap_or("");
            template
                .replace("{subject}", focus.subject.display_name())
                .replace("{strongest}", strongest)
        }
        None => template.to_string(),
    }
}

fn evaluate(groups: &[RuleGroup], ctx: &RuleContext, out: &mut Suggestions) {
    for group in groups {
        if let Some(rule) = group.rules.iter().find(|rule| (rule.when)(ctx)) {
            debug!(group = group.name, "suggestion rule fired");
            for (category, template) in rule.emits {
                out.entry(*category).or_default().push(render(template, ctx));
            }
        }
    }
}

/// Categorised recommendations for a learner given their session history.
pub fn generate_suggestions(learner: &Learner, sessions: &[StudySession]) -> Suggestions {
    let mut out: Suggestions = Category::ALL.iter().map(|c| (*c, Vec::new())).collect();

    let mut ctx = RuleContext {
        learner,
        total_sessions: sessions.iter().filter(|s| !s.is_active()).count(),
        mean_attention: stats::overall_attention(sessions),
        best_hour: stats::best_time_of_day(sessions),
        focus: None,
    };
    evaluate(LEARNER_GROUPS, &ctx, &mut out);

    let means = stats::subject_means(sessions);
    for (subject, mean) in &means {
        let strongest_other = means
            .iter()
            .filter(|(other, _)| *other != subject)
            .fold(None::<(&Subject, f64)>, |best, (other, m)| match best {
                Some((_, current)) if *m <= current => best,
                _ => Some((other, *m)),
            });

        ctx.focus = Some(SubjectFocus {
            subject,
            mean: *mean,
            strongest_other,
        });
        evaluate(SUBJECT_GROUPS, &ctx, &mut out);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn learner(age: i32, stage: EducationStage, gender: Gender) -> Learner {
        Learner {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            nickname: "Kai".to_string(),
            gender,
            age,
            education_stage: stage,
            created_at: Utc::now(),
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn session(subject: Subject, start: DateTime<Utc>, attention: Option<f64>) -> StudySession {
        StudySession {
            id: Uuid::new_v4(),
            learner_id: Uuid::nil(),
            subject,
            duration_minutes: 25,
            start_time: start,
            end_time: Some(start + chrono::Duration::minutes(25)),
            avg_attention: attention,
            avg_emotion_score: None,
        }
    }

    #[test]
    fn empty_history_only_yields_profile_rules() {
        let kid = learner(7, EducationStage::Elementary, Gender::Female);
        let suggestions = generate_suggestions(&kid, &[]);

        assert_eq!(suggestions.len(), Category::ALL.len());
        assert_eq!(suggestions[&Category::AgeAppropriate].len(), 2);
        assert_eq!(suggestions[&Category::LearningStyle].len(), 1);
        assert!(suggestions[&Category::Schedule].is_empty());
        assert!(suggestions[&Category::AttentionImprovement].is_empty());
        assert!(suggestions[&Category::SubjectSpecific].is_empty());
    }

    #[test]
    fn young_elementary_gets_advice_high_school_never_sees() {
        let young = generate_suggestions(&learner(7, EducationStage::Elementary, Gender::Male), &[]);
        let teen = generate_suggestions(&learner(17, EducationStage::High, Gender::Male), &[]);

        let teen_messages = &teen[&Category::AgeAppropriate];
        assert!(young[&Category::AgeAppropriate]
            .iter()
            .any(|m| !teen_messages.contains(m)));
    }

    #[test]
    fn elementary_branch_splits_on_age_eight() {
        let seven = generate_suggestions(&learner(7, EducationStage::Elementary, Gender::Male), &[]);
        let nine = generate_suggestions(&learner(9, EducationStage::Elementary, Gender::Male), &[]);
        assert_ne!(seven[&Category::AgeAppropriate], nine[&Category::AgeAppropriate]);
        assert_eq!(nine[&Category::AgeAppropriate].len(), 2);
    }

    #[test]
    fn attention_tier_adds_paired_schedule_advice() {
        let kid = learner(12, EducationStage::Middle, Gender::Female);
        let sessions = vec![
            session(Subject::Math, at(1, 10), Some(1.2)),
            session(Subject::Math, at(2, 10), Some(1.4)),
        ];
        let suggestions = generate_suggestions(&kid, &sessions);

        let attention = &suggestions[&Category::AttentionImprovement];
        assert_eq!(attention.len(), 2);
        assert!(attention[0].contains("distractions"));

        let schedule = &suggestions[&Category::Schedule];
        assert!(schedule.iter().any(|m| m.contains("15-20 minutes")));
        assert!(schedule.iter().any(|m| m.contains("late morning (9-12)")));
        assert!(schedule.iter().any(|m| m.contains("before 9 pm")));
    }

    #[test]
    fn hours_outside_named_windows_skip_time_slot_advice() {
        let kid = learner(16, EducationStage::High, Gender::Male);
        let sessions = vec![session(Subject::Art, at(1, 12), Some(2.7))];
        let schedule = &generate_suggestions(&kid, &sessions)[&Category::Schedule];

        assert_eq!(schedule.len(), 2);
        assert!(schedule[0].contains("30-35 minutes"));
        assert!(schedule[1].contains("full night's sleep"));
    }

    #[test]
    fn subject_rules_specialise_by_subject_and_stage() {
        let kid = learner(8, EducationStage::Elementary, Gender::Female);
        let sessions = vec![
            session(Subject::Math, at(1, 16), Some(1.5)),
            session(Subject::Science, at(2, 16), Some(1.9)),
            session(Subject::from_code("robotics"), at(3, 16), Some(2.4)),
        ];
        let advice = &generate_suggestions(&kid, &sessions)[&Category::SubjectSpecific];

        assert!(advice.iter().any(|m| m.starts_with("Math needs reinforcement; math games")));
        assert!(advice.iter().any(|m| m.starts_with("Science needs reinforcement; experiments")));
        assert!(advice.iter().any(|m| m.starts_with("robotics is going well")));
    }

    #[test]
    fn lagging_subject_is_pointed_at_strongest_one() {
        let kid = learner(13, EducationStage::Middle, Gender::Male);
        let sessions = vec![
            session(Subject::Math, at(1, 16), Some(1.6)),
            session(Subject::Art, at(2, 16), Some(2.9)),
            session(Subject::Science, at(3, 16), Some(2.2)),
        ];
        let advice = &generate_suggestions(&kid, &sessions)[&Category::SubjectSpecific];
        let transfers: Vec<&String> = advice.iter().filter(|m| m.starts_with("Attention in")).collect();

        assert_eq!(transfers.len(), 2);
        assert!(transfers
            .iter()
            .any(|m| m.contains("higher than in Math") && m.contains("work in Art")));
        assert!(transfers.iter().any(|m| m.contains("higher than in Science")));
    }

    #[test]
    fn habit_transfer_needs_three_sessions() {
        let kid = learner(13, EducationStage::Middle, Gender::Male);
        let sessions = vec![
            session(Subject::Math, at(1, 16), Some(1.2)),
            session(Subject::Art, at(2, 16), Some(3.0)),
        ];
        let advice = &generate_suggestions(&kid, &sessions)[&Category::SubjectSpecific];
        assert!(advice.iter().all(|m| !m.starts_with("Attention in")));
    }

    #[test]
    fn learners_up_to_ten_are_steered_away_from_late_study() {
        let kid = learner(9, EducationStage::Elementary, Gender::Female);
        let sessions = vec![session(Subject::Math, at(1, 16), Some(2.0))];
        let schedule = &generate_suggestions(&kid, &sessions)[&Category::Schedule];

        assert!(schedule.iter().any(|m| m.contains("after 8 pm")));
        assert!(schedule.iter().all(|m| !m.contains("before 9 pm")));
    }

    #[test]
    fn habit_transfer_needs_a_gap_above_half_a_level() {
        let kid = learner(13, EducationStage::Middle, Gender::Male);
        let sessions = vec![
            session(Subject::Math, at(1, 16), Some(2.0)),
            session(Subject::Art, at(2, 16), Some(2.5)),
            session(Subject::Science, at(3, 16), Some(2.0)),
        ];
        let advice = &generate_suggestions(&kid, &sessions)[&Category::SubjectSpecific];
        assert!(advice.iter().all(|m| !m.starts_with("Attention in")));
    }

    #[test]
    fn open_session_does_not_count_towards_habit_transfer() {
        let kid = learner(13, EducationStage::Middle, Gender::Male);
        let mut open = session(Subject::Science, at(3, 16), None);
        open.end_time = None;
        let sessions = vec![
            session(Subject::Math, at(1, 16), Some(1.2)),
            session(Subject::Art, at(2, 16), Some(3.0)),
            open,
        ];
        let advice = &generate_suggestions(&kid, &sessions)[&Category::SubjectSpecific];
        assert!(advice.iter().all(|m| !m.starts_with("Attention in")));
    }

    #[test]
    fn suggestions_are_deterministic() {
        let kid = learner(10, EducationStage::Elementary, Gender::Male);
        let sessions = vec![
            session(Subject::Math, at(1, 7), Some(2.0)),
            session(Subject::Cs, at(2, 20), Some(2.0)),
        ];
        assert_eq!(
            generate_suggestions(&kid, &sessions),
            generate_suggestions(&kid, &sessions)
        );
    }
}
