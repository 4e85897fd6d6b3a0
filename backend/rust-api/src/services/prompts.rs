use crate::models::conversation::{ChatMessage, ChatRole};
use crate::models::curriculum::{Curriculum, Depth, Difficulty};

/// Only the tail of a long conversation is replayed to the model.
const MENTOR_HISTORY_LIMIT: usize = 20;

pub fn curriculum_prompt(topic: &str, difficulty: Difficulty, depth: Depth) -> String {
    format!(
        r#"Generate a comprehensive curriculum for the topic: "{topic}".
Difficulty level: {difficulty}
Depth: {depth}

Return ONLY a valid JSON object with this exact structure:
{{
  "title": "curriculum title",
  "description": "brief description",
  "modules": [
    {{
      "title": "module title",
      "lessons": [
        {{
          "title": "lesson title",
          "content": "lesson content with detailed explanation"
        }}
      ]
    }}
  ]
}}

Make the curriculum detailed and educational. Include 3-5 modules with 2-4 lessons each."#,
        topic = topic,
        difficulty = difficulty.as_str(),
        depth = depth.as_str(),
    )
}

pub fn quiz_prompt(curriculum: &Curriculum) -> String {
    let module_titles = curriculum
        .modules
        .iter()
        .map(|m| m.title.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Generate a quiz based on this curriculum:
Title: {title}
Topic: {topic}
Modules: {modules}

Create 10-15 multiple choice questions that test understanding of the curriculum content.

Return ONLY a valid JSON object with this exact structure:
{{
  "questions": [
    {{
      "question": "question text",
      "options": ["option A", "option B", "option C", "option D"],
      "correctAnswer": 0,
      "topic": "module or topic this question tests"
    }}
  ]
}}

Every question has exactly 4 options. The correctAnswer is the index (0-3) of the correct option."#,
        title = curriculum.title,
        topic = curriculum.topic,
        modules = module_titles,
    )
}

pub fn mentor_prompt(history: &[ChatMessage], message: &str) -> String {
    let mut prompt = String::from(
        "You are a patient, encouraging learning mentor. Answer the student's question \
         clearly and concisely, suggest next steps when useful, and ask a follow-up \
         question if their goal is unclear.\n\n",
    );

    if !history.is_empty() {
        let skip = history.len().saturating_sub(MENTOR_HISTORY_LIMIT);
        prompt.push_str("Conversation so far:\n");
        for entry in &history[skip..] {
            let speaker = match entry.role {
                ChatRole::User => "Student",
                ChatRole::Assistant => "Mentor",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, entry.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Student: {}\nMentor:", message));
    prompt
}
