use std::thread::JoinHandle;

use tracing::{Level, span};

/// Every stage in the pipeline is one of these: a type that builds its
/// state and a caller-visible handle in `init`, then loops until completion
/// in `run`. `run` is joinable and fallible so the launcher can aggregate a
/// single process exit code from every spawned stage instead of only
/// observing a panic.
pub(crate) trait InitializableThread: Sized {
    type InitOptions: Send + 'static;

    /// Returned to the caller of `spawn` once `init` succeeds, e.g. the
    /// `Sender` half of this stage's input queue.
    type SpawnOutput: Send + 'static;
    type SpawnError: std::error::Error + Send + 'static;
    type RunError: std::error::Error + Send + 'static;

    fn init(options: Self::InitOptions) -> Result<(Self, Self::SpawnOutput), Self::SpawnError>;

    fn run(self) -> Result<(), Self::RunError>;

    fn spawn<Id: ToString>(
        thread_instance_id: Id,
        opts: Self::InitOptions,
    ) -> Result<(Self::SpawnOutput, JoinHandle<Result<(), Self::RunError>>), Self::SpawnError> {
        let (result_sender, result_receiver) = crossbeam_channel::bounded(0);

        let instance_id = thread_instance_id.to_string();
        let metadata = Self::metadata();
        let handle = std::thread::Builder::new()
            .name(metadata.thread_name.to_string())
            .spawn(move || {
                let _span = span!(
                    Level::INFO,
                    "Thread",
                    thread = metadata.thread_name,
                    instance = format!("{} {}", metadata.thread_instance_name, instance_id),
                )
                .entered();
                let state = match Self::init(opts) {
                    Ok((state, init_output)) => {
                        result_sender.send(Ok(init_output)).unwrap();
                        state
                    }
                    Err(err) => {
                        result_sender.send(Err(err)).unwrap();
                        return Ok(());
                    }
                };
                Self::run(state)
            })
            .unwrap();

        let init_output = result_receiver.recv().unwrap()?;
        Ok((init_output, handle))
    }

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            thread_name: "Initializable thread".to_string(),
            thread_instance_name: "Instance".to_string(),
        }
    }
}

pub(crate) struct ThreadMetadata {
    pub thread_name: String,
    pub thread_instance_name: String,
}
