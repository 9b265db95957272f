//! Máquina de estados dos contêineres.

use crate::error::{EntityKind, KernelError, Result};
use crate::store::model::ContainerState;

/// Eventos aplicáveis a um contêiner existente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerEvent {
    Start,
    Stop,
    Remove { force: bool },
    Exec,
}

/// Resultado de aplicar um evento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Novo estado a persistir
    Changed(ContainerState),
    /// Evento aceito sem mudança de estado (idempotente)
    Unchanged,
}

/// Função de transição pura; nenhum outro caminho muda `ContainerState`.
///
/// | de               | evento        | para     |
/// |------------------|---------------|----------|
/// | created/stopped  | start         | running  |
/// | running          | start         | (igual)  |
/// | running/created  | stop          | stopped  |
/// | stopped          | stop          | (igual)  |
/// | created/stopped  | remove        | removed  |
/// | running          | remove+force  | removed  |
/// | running          | exec          | (igual)  |
pub fn transition(name: &str, from: ContainerState, event: ContainerEvent) -> Result<Transition> {
    use ContainerState::*;

    match (from, event) {
        (Removed, _) => Err(KernelError::not_found(EntityKind::Container, name)),

        (Created | Stopped, ContainerEvent::Start) => Ok(Transition::Changed(Running)),
        (Running, ContainerEvent::Start) => Ok(Transition::Unchanged),

        (Running | Created, ContainerEvent::Stop) => Ok(Transition::Changed(Stopped)),
        (Stopped, ContainerEvent::Stop) => Ok(Transition::Unchanged),

        (Running, ContainerEvent::Remove { force: false }) => {
            Err(KernelError::ContainerRunning(name.to_string()))
        }
        (_, ContainerEvent::Remove { .. }) => Ok(Transition::Changed(Removed)),

        (Running, ContainerEvent::Exec) => Ok(Transition::Unchanged),
        (_, ContainerEvent::Exec) => Err(KernelError::ContainerNotRunning(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContainerState::*;

    fn apply(from: ContainerState, event: ContainerEvent) -> Result<ContainerState> {
        Ok(match transition("web", from, event)? {
            Transition::Changed(to) => to,
            Transition::Unchanged => from,
        })
    }

    #[test]
    fn test_happy_path() {
        let mut state = Created;
        state = apply(state, ContainerEvent::Start).unwrap();
        assert_eq!(state, Running);
        state = apply(state, ContainerEvent::Exec).unwrap();
        assert_eq!(state, Running);
        state = apply(state, ContainerEvent::Stop).unwrap();
        assert_eq!(state, Stopped);
        state = apply(state, ContainerEvent::Start).unwrap();
        assert_eq!(state, Running);
        state = apply(state, ContainerEvent::Remove { force: true }).unwrap();
        assert_eq!(state, Removed);
    }

    #[test]
    fn test_idempotent_events() {
        assert_eq!(
            transition("web", Running, ContainerEvent::Start).unwrap(),
            Transition::Unchanged
        );
        assert_eq!(
            transition("web", Stopped, ContainerEvent::Stop).unwrap(),
            Transition::Unchanged
        );
        assert_eq!(apply(Created, ContainerEvent::Stop).unwrap(), Stopped);
    }

    #[test]
    fn test_rejected_events() {
        assert!(matches!(
            transition("web", Running, ContainerEvent::Remove { force: false }),
            Err(KernelError::ContainerRunning(_))
        ));
        for state in [Created, Stopped] {
            assert!(matches!(
                transition("web", state, ContainerEvent::Exec),
                Err(KernelError::ContainerNotRunning(_))
            ));
            assert_eq!(
                apply(state, ContainerEvent::Remove { force: false }).unwrap(),
                Removed
            );
        }
        for event in [ContainerEvent::Start, ContainerEvent::Stop, ContainerEvent::Exec] {
            assert!(matches!(
                transition("web", Removed, event),
                Err(KernelError::NotFound { .. })
            ));
        }
    }
}
