use anyhow::anyhow;

use crate::task::{
  Task,
  TaskPatch
};
use crate::upload::FileChoice;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum AuthMode {
  #[default]
  SignIn,
  SignUp
}

impl AuthMode {
  pub fn label(self) -> &'static str {
    match self {
      | AuthMode::SignIn => "Sign In",
      | AuthMode::SignUp => "Sign Up"
    }
  }

  pub fn other(self) -> Self {
    match self {
      | AuthMode::SignIn => AuthMode::SignUp,
      | AuthMode::SignUp => AuthMode::SignIn
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct AuthForm {
  pub email:    String,
  pub password: String,
  pub mode:     AuthMode
}

impl AuthForm {
  pub fn new(
    mode: AuthMode,
    email: impl Into<String>,
    password: impl Into<String>
  ) -> Self {
    Self {
      email: email.into(),
      password: password.into(),
      mode
    }
  }

  pub fn toggle_mode(&mut self) {
    self.mode = self.mode.other();
  }
}

/// Edits applied to the new-task form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  SetTitle(String),
  SetDescription(String),
  SetImage(Option<FileChoice>),
  SetVideo(Option<FileChoice>)
}

/// State of the new-task form.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TaskForm {
  pub title:       String,
  pub description: String,
  pub image:       Option<FileChoice>,
  pub video:       Option<FileChoice>
}

/// What a valid form submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
  pub title:       String,
  pub description: String,
  pub image:       Option<FileChoice>,
  pub video:       Option<FileChoice>
}

impl TaskForm {
  pub fn apply(&mut self, event: FormEvent) {
    match event {
      | FormEvent::SetTitle(title) => {
        self.title = title;
      }
      | FormEvent::SetDescription(text) => {
        self.description = text;
      }
      | FormEvent::SetImage(file) => {
        self.image = file;
      }
      | FormEvent::SetVideo(file) => {
        self.video = file;
      }
    }
  }

  /// `None` when the title is blank; the
  /// form is left as it was.
  pub fn submit(&self) -> Option<TaskDraft> {
    if self.title.trim().is_empty() {
      return None;
    }

    Some(TaskDraft {
      title:       self.title.clone(),
      description: self.description.clone(),
      image:       self.image.clone(),
      video:       self.video.clone()
    })
  }

  pub fn reset(&mut self) {
    *self = TaskForm::default();
  }

  pub fn is_empty(&self) -> bool {
    *self == TaskForm::default()
  }
}

/// Inline editor for an existing row.
/// Only title and description can change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditForm {
  pub id:          i64,
  pub title:       String,
  pub description: String
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
  Save(i64, TaskPatch),
  Cancelled
}

impl EditForm {
  pub fn for_task(task: &Task) -> Self {
    Self {
      id:          task.id,
      title:       task.title.clone(),
      description: task.description.clone()
    }
  }

  pub fn set_title(
    &mut self,
    title: impl Into<String>
  ) {
    self.title = title.into();
  }

  pub fn set_description(
    &mut self,
    description: impl Into<String>
  ) {
    self.description = description.into();
  }

  pub fn validate(
    &self
  ) -> anyhow::Result<()> {
    if self.title.trim().is_empty() {
      return Err(anyhow!(
        "Title cannot be empty"
      ));
    }
    Ok(())
  }

  pub fn confirm(
    self
  ) -> anyhow::Result<EditOutcome> {
    self.validate()?;
    Ok(EditOutcome::Save(
      self.id,
      TaskPatch {
        title:       self.title,
        description: self.description
      }
    ))
  }

  pub fn cancel(self) -> EditOutcome {
    EditOutcome::Cancelled
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use std::path::PathBuf;
  use uuid::Uuid;

  #[test]
  fn blank_title_does_not_submit() {
    let mut form = TaskForm::default();
    form.apply(FormEvent::SetTitle(
      "   ".to_string()
    ));
    form.apply(FormEvent::SetDescription(
      "details".to_string()
    ));

    assert_eq!(form.submit(), None);
    assert_eq!(form.description, "details");
  }

  #[test]
  fn submit_then_reset_clears_every_field()
  {
    let mut form = TaskForm::default();
    form.apply(FormEvent::SetTitle(
      "T1".to_string()
    ));
    form.apply(FormEvent::SetImage(Some(
      FileChoice::Path(PathBuf::from(
        "cat.png"
      ))
    )));

    let draft =
      form.submit().expect("draft");
    assert_eq!(draft.title, "T1");
    assert!(draft.image.is_some());
    assert!(!form.is_empty());

    form.reset();
    assert!(form.is_empty());
  }

  #[test]
  fn auth_mode_toggles() {
    let mut form = AuthForm::default();
    assert_eq!(form.mode, AuthMode::SignIn);
    form.toggle_mode();
    assert_eq!(form.mode, AuthMode::SignUp);
    assert_eq!(form.mode.label(), "Sign Up");
    form.toggle_mode();
    assert_eq!(form.mode, AuthMode::SignIn);
  }

  #[test]
  fn edit_form_validates_and_builds_patch() {
    let task = Task {
      id:          3,
      title:       "old".to_string(),
      description: "desc".to_string(),
      image_url:   None,
      video_url:   None,
      created_at:  Utc::now(),
      user_id:     Uuid::new_v4()
    };

    let mut form = EditForm::for_task(&task);
    form.set_title(" ");
    assert!(form.clone().confirm().is_err());

    form.set_title("new");
    assert_eq!(
      form.confirm().expect("confirm"),
      EditOutcome::Save(
        3,
        TaskPatch {
          title:       "new".to_string(),
          description: "desc".to_string()
        }
      )
    );
    assert_eq!(
      EditForm::for_task(&task).cancel(),
      EditOutcome::Cancelled
    );
  }
}
