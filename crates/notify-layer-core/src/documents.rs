//! GraphQL documents of the process API.

/// A named GraphQL operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Document {
    pub operation_name: &'static str,
    pub query: &'static str,
}

pub const START_PROCESS: Document = Document {
    operation_name: "StartProcess",
    query: "mutation StartProcess($process_id: String!) {
  startProcess(process_id: $process_id) {
    id
    status
  }
}",
};

/// Same resolver as [`START_PROCESS`], exposed behind the lambda authorizer
pub const START_PROCESS_LAMBDA: Document = Document {
    operation_name: "StartProcessLambda",
    query: "mutation StartProcessLambda($process_id: String!) {
  startProcessLambda(process_id: $process_id) {
    id
    status
  }
}",
};

/// Issued by the backend worker; triggers `onProcessDone`
pub const END_PROCESS: Document = Document {
    operation_name: "EndProcess",
    query: "mutation EndProcess($process_id: String!) {
  endProcess(process_id: $process_id) {
    id
    status
  }
}",
};

pub const GET_PROCESS: Document = Document {
    operation_name: "GetProcess",
    query: "query GetProcess($process_id: String!) {
  getProcess(process_id: $process_id) {
    id
    status
  }
}",
};

pub const ON_PROCESS_DONE: Document = Document {
    operation_name: "OnProcessDone",
    query: "subscription OnProcessDone($id: String!) {
  onProcessDone(id: $id) {
    id
    status
  }
}",
};

/// Variable carrying the process id in mutations and queries
pub const PROCESS_ID_VARIABLE: &str = "process_id";

/// Variable the subscription filters on
pub const SUBSCRIPTION_FILTER_VARIABLE: &str = "id";
